// src/facts.rs
//! Grounded fact lookup over news and reports.

use std::sync::Arc;

use chrono::Local;

use crate::conversation::ConversationWindow;
use crate::error::Result;
use crate::llm::DynLlm;
use crate::prompts::{PromptTemplates, PromptVars, TemplateId};
use crate::store::EvidenceGateway;

pub const NOT_FOUND_SENTINEL: &str =
    "I cannot find information in my database to answer that right now.";

const FACT_TOP_K: usize = 5;

pub struct FactAnswerer {
    gateway: EvidenceGateway,
    llm: DynLlm,
    templates: Arc<PromptTemplates>,
}

impl FactAnswerer {
    pub fn new(gateway: EvidenceGateway, llm: DynLlm, templates: Arc<PromptTemplates>) -> Self {
        Self {
            gateway,
            llm,
            templates,
        }
    }

    /// Top-5 similarity search with no metadata filter. Returns the sentinel
    /// without an LLM call when nothing is retrieved.
    pub async fn lookup_facts(&self, query: &str, history: &ConversationWindow) -> Result<String> {
        let docs = self.gateway.search(query, FACT_TOP_K, None).await?;
        if docs.is_empty() {
            tracing::info!(target: "facts", "no evidence; answering with sentinel");
            return Ok(NOT_FOUND_SENTINEL.to_string());
        }

        let context = docs
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let chat_history = history.render();
        let date = Local::now().format("%Y-%m-%d").to_string();

        let vars: PromptVars = [
            ("context", context.as_str()),
            ("chat_history", chat_history.as_str()),
            ("question", query),
            ("date", date.as_str()),
        ]
        .into_iter()
        .collect();
        let prompt = self.templates.render(TemplateId::Facts, &vars)?;
        tracing::debug!(target: "facts", chunks = docs.len(), "grounding prompt built");
        self.llm.complete(&prompt).await
    }
}
