// src/router.rs
//! Intent router: asks the LLM which reasoning mode a query needs and falls
//! back to grounded fact lookup whenever the answer is unusable.

use std::fmt;
use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::llm::DynLlm;
use crate::prompts::{PromptTemplates, PromptVars, TemplateId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    FactLookup,
    TrendAnalysis,
    Summary,
    General,
}

impl Intent {
    /// Checked in this order against the raw model output.
    pub const ALL: [Intent; 4] = [
        Intent::FactLookup,
        Intent::TrendAnalysis,
        Intent::Summary,
        Intent::General,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Intent::FactLookup => "FACT_LOOKUP",
            Intent::TrendAnalysis => "TREND_ANALYSIS",
            Intent::Summary => "SUMMARY",
            Intent::General => "GENERAL",
        }
    }

    /// First known label contained in `raw`, tolerating surrounding noise.
    pub fn from_model_output(raw: &str) -> Option<Intent> {
        let raw = raw.trim();
        Intent::ALL.into_iter().find(|i| raw.contains(i.label()))
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub struct IntentRouter {
    llm: DynLlm,
    templates: Arc<PromptTemplates>,
}

impl IntentRouter {
    pub fn new(llm: DynLlm, templates: Arc<PromptTemplates>) -> Self {
        Self { llm, templates }
    }

    /// Never fails: unusable output or an unavailable LLM yields `FactLookup`.
    pub async fn classify(&self, query: &str) -> Intent {
        match self.try_classify(query).await {
            Ok(intent) => {
                tracing::info!(target: "router", %intent, "router decision");
                intent
            }
            Err(e) => {
                counter!("router_fallback_total").increment(1);
                tracing::warn!(target: "router", error = %e, "routing fell back to FACT_LOOKUP");
                Intent::FactLookup
            }
        }
    }

    /// The raw classification, with every failure reported as an error.
    pub async fn try_classify(&self, query: &str) -> Result<Intent> {
        let vars: PromptVars = [("question", query)].into_iter().collect();
        let prompt = self.templates.render(TemplateId::Router, &vars)?;
        let raw = self.llm.complete(&prompt).await?;
        Intent::from_model_output(&raw).ok_or(AgentError::ClassificationAmbiguous(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_matched_by_containment() {
        assert_eq!(
            Intent::from_model_output("Category: TREND_ANALYSIS."),
            Some(Intent::TrendAnalysis)
        );
        assert_eq!(Intent::from_model_output("  SUMMARY\n"), Some(Intent::Summary));
        assert_eq!(Intent::from_model_output("summary"), None);
        assert_eq!(Intent::from_model_output(""), None);
    }

    #[test]
    fn serde_uses_wire_labels() {
        let s = serde_json::to_string(&Intent::FactLookup).unwrap();
        assert_eq!(s, "\"FACT_LOOKUP\"");
    }
}
