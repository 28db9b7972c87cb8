// src/prompts.rs
//! Prompt templates with `{name}` slots. Built-in defaults can be overridden
//! per template from a TOML file:
//!
//! ```toml
//! version = "2025-06"
//! [templates]
//! trend = "..."
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::error::{AgentError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateId {
    Router,
    Trend,
    Facts,
    Summary,
}

impl TemplateId {
    pub const ALL: [TemplateId; 4] = [
        TemplateId::Router,
        TemplateId::Trend,
        TemplateId::Facts,
        TemplateId::Summary,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            TemplateId::Router => "router",
            TemplateId::Trend => "trend",
            TemplateId::Facts => "facts",
            TemplateId::Summary => "summary",
        }
    }

    /// Slots that must be supplied when rendering.
    pub fn required_vars(&self) -> &'static [&'static str] {
        match self {
            TemplateId::Router => &["question"],
            TemplateId::Trend => &["old_context", "new_context", "topic"],
            TemplateId::Facts => &["context", "chat_history", "question", "date"],
            TemplateId::Summary => &["text"],
        }
    }

    fn builtin(&self) -> &'static str {
        match self {
            TemplateId::Router => ROUTER_TEMPLATE,
            TemplateId::Trend => TREND_TEMPLATE,
            TemplateId::Facts => FACTS_TEMPLATE,
            TemplateId::Summary => SUMMARY_TEMPLATE,
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Named values for template slots.
pub type PromptVars<'a> = HashMap<&'static str, &'a str>;

#[derive(Debug, Clone)]
pub struct PromptTemplates {
    version: String,
    templates: HashMap<TemplateId, String>,
}

#[derive(Deserialize)]
struct TemplateFile {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    templates: HashMap<String, String>,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptTemplates {
    pub fn builtin() -> Self {
        Self {
            version: "builtin-1".to_string(),
            templates: TemplateId::ALL
                .iter()
                .map(|id| (*id, id.builtin().to_string()))
                .collect(),
        }
    }

    /// Built-ins overlaid with the templates found in `path`.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading prompt templates from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let file: TemplateFile = toml::from_str(s)?;
        let mut out = Self::builtin();
        for (key, body) in file.templates {
            let Some(id) = TemplateId::ALL.iter().find(|id| id.key() == key) else {
                anyhow::bail!("unknown prompt template `{key}`");
            };
            for var in id.required_vars() {
                if !body.contains(&format!("{{{var}}}")) {
                    anyhow::bail!("template `{key}` is missing slot {{{var}}}");
                }
            }
            out.templates.insert(*id, body);
        }
        if let Some(v) = file.version {
            out.version = v;
        }
        Ok(out)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Substitute `{name}` slots. Every required var must be present; slots
    /// without a value are left as written.
    pub fn render(&self, id: TemplateId, vars: &PromptVars<'_>) -> Result<String> {
        for var in id.required_vars() {
            if !vars.contains_key(var) {
                return Err(AgentError::Config(format!(
                    "template `{id}` rendered without `{var}`"
                )));
            }
        }
        let template = self
            .templates
            .get(&id)
            .map(String::as_str)
            .unwrap_or_else(|| id.builtin());
        Ok(substitute(template, vars))
    }
}

/// Single pass so substituted text is never re-scanned for slots.
fn substitute(template: &str, vars: &PromptVars<'_>) -> String {
    let mut out = String::with_capacity(template.len() + 256);
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_slot_name(&after[..close]) => {
                let name = &after[..close];
                match vars.get(name) {
                    Some(v) => out.push_str(v),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_slot_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

const ROUTER_TEMPLATE: &str = r#"You are the query router of a UK economic insight assistant.
Classify the user's question into exactly one category:

FACT_LOOKUP    - a specific fact, figure, or event (e.g. "What is the current inflation rate?")
TREND_ANALYSIS - how something has changed over time or compared with before (e.g. "How has the outlook on interest rates changed?")
SUMMARY        - an overview or report of recent news (e.g. "Give me today's market summary")
GENERAL        - greetings, small talk, or questions about the assistant itself

Question: {question}

Answer with the category label only."#;

const TREND_TEMPLATE: &str = r#"You are an economic analyst tracking how the story on "{topic}" has evolved.

PREVIOUS REPORT (old view):
{old_context}

NEWS PUBLISHED SINCE THAT REPORT (new view):
{new_context}

Compare the two views for the topic "{topic}".
- Write exactly 3 bullet points, each in the form "Old: ... -> New: ...", quoting the concrete figures from both sides.
- If the new view is empty or says nothing different about this topic, do not invent changes; reply with a single sentence stating that the situation for this topic is stable / unchanged since the last report.
- Use only the information above."#;

const FACTS_TEMPLATE: &str = r#"You are a helpful UK economic advisor. Today's date is {date}.
Answer the question using only the context below (retrieved from news articles and earlier reports).

Context:
{context}

Recent conversation:
{chat_history}

Question: {question}

Instructions:
- If the context does not contain the answer, say "I cannot find information in my database to answer that right now."
- Do NOT make up numbers or facts.
- If retrieved passages disagree on a figure, report BOTH values with their sources and dates instead of picking one.
- Cite the article titles you relied on.

Answer:"#;

const SUMMARY_TEMPLATE: &str = r#"You are an expert economic analyst specialising in the UK economy.
Recent news articles:

{text}

Write a concise Markdown market report with exactly these sections:
## Executive Summary
Two or three sentences on the overall picture.
## Key Developments
Bullet points for the main themes (inflation, interest rates, housing, labour market, ...), each with the latest figures.
## Market Sentiment
Positive, Neutral or Negative, with a one-sentence justification.
## Active Entities
Organisations, people and places driving the news.
## References
The article titles used."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_slots_once() {
        let t = PromptTemplates::builtin();
        let vars: PromptVars = [
            ("old_context", "old {topic}"),
            ("new_context", "new"),
            ("topic", "inflation"),
        ]
        .into_iter()
        .collect();
        let out = t.render(TemplateId::Trend, &vars).unwrap();
        assert!(out.contains("\"inflation\""));
        // substituted text is not re-expanded
        assert!(out.contains("old {topic}"));
    }

    #[test]
    fn missing_required_var_is_config_error() {
        let t = PromptTemplates::builtin();
        let vars: PromptVars = [("question", "q")].into_iter().collect();
        let err = t.render(TemplateId::Facts, &vars).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn toml_overrides_validate_slots() {
        let ok = PromptTemplates::from_toml_str(
            "version = \"v2\"\n[templates]\nsummary = \"Digest:\\n{text}\"\n",
        )
        .unwrap();
        assert_eq!(ok.version(), "v2");
        let vars: PromptVars = [("text", "body")].into_iter().collect();
        assert_eq!(ok.render(TemplateId::Summary, &vars).unwrap(), "Digest:\nbody");

        assert!(PromptTemplates::from_toml_str("[templates]\nsummary = \"no slot\"\n").is_err());
        assert!(PromptTemplates::from_toml_str("[templates]\nbogus = \"{text}\"\n").is_err());
    }

    #[test]
    fn braces_that_are_not_slots_survive() {
        let vars: PromptVars = [("a", "1")].into_iter().collect();
        assert_eq!(substitute("{\"json\": {a}} {", &vars), "{\"json\": 1} {");
    }
}
