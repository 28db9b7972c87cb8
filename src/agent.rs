// src/agent.rs
//! Question answering entry point: route, dispatch, render errors as text.

use std::sync::Arc;

use crate::conversation::ConversationWindow;
use crate::error::CREDENTIAL_MISSING_MESSAGE;
use crate::facts::FactAnswerer;
use crate::llm::DynLlm;
use crate::prompts::PromptTemplates;
use crate::report::{ReportArchive, ReportGenerator};
use crate::router::{Intent, IntentRouter};
use crate::store::EvidenceGateway;
use crate::trend::TrendAnalyzer;

pub const GENERAL_INTRO: &str = "I am the UK Economic Insight Agent. I can provide market reports, analyze trends, or answer specific questions about the economy. How can I help you today?";

/// All reasoning components over one gateway, one LLM and one template set.
pub struct InsightAgent {
    llm: DynLlm,
    router: IntentRouter,
    trend: TrendAnalyzer,
    facts: FactAnswerer,
    reports: Arc<ReportGenerator>,
}

impl InsightAgent {
    pub fn new(
        gateway: EvidenceGateway,
        llm: DynLlm,
        templates: Arc<PromptTemplates>,
        archive: ReportArchive,
    ) -> Self {
        Self {
            router: IntentRouter::new(llm.clone(), templates.clone()),
            trend: TrendAnalyzer::new(gateway.clone(), llm.clone(), templates.clone()),
            facts: FactAnswerer::new(gateway.clone(), llm.clone(), templates.clone()),
            reports: Arc::new(ReportGenerator::new(gateway, llm.clone(), templates, archive)),
            llm,
        }
    }

    pub fn llm(&self) -> &DynLlm {
        &self.llm
    }

    pub fn router(&self) -> &IntentRouter {
        &self.router
    }

    pub fn trend(&self) -> &TrendAnalyzer {
        &self.trend
    }

    pub fn facts(&self) -> &FactAnswerer {
        &self.facts
    }

    /// Shared with the refresh scheduler for auto-reports.
    pub fn reports(&self) -> Arc<ReportGenerator> {
        Arc::clone(&self.reports)
    }

    /// Answer `query` in one of the four modes. Never fails: component errors
    /// come back as readable text.
    pub async fn answer_question(&self, query: &str, history: &ConversationWindow) -> String {
        if !self.llm.is_configured() {
            return CREDENTIAL_MISSING_MESSAGE.to_string();
        }

        let intent = self.router.classify(query).await;

        let answer = match intent {
            Intent::TrendAnalysis => self.trend.analyze_trend(Some(query)).await,
            Intent::Summary => self.reports.generate_report().await,
            Intent::General => Ok(GENERAL_INTRO.to_string()),
            Intent::FactLookup => self.facts.lookup_facts(query, history).await,
        };

        answer.unwrap_or_else(|e| {
            tracing::warn!(target: "agent", %intent, error = %e, "answer failed");
            e.user_message()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;
    use crate::store::InMemoryStore;

    fn agent(llm: MockLlm) -> (InsightAgent, Arc<MockLlm>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(llm);
        let gateway = EvidenceGateway::new(Arc::new(InMemoryStore::new()));
        let a = InsightAgent::new(
            gateway,
            llm.clone(),
            Arc::new(PromptTemplates::builtin()),
            ReportArchive::new(dir.path()),
        );
        (a, llm, dir)
    }

    #[tokio::test]
    async fn missing_credential_short_circuits() {
        let (a, llm, _d) = agent(MockLlm::unavailable());
        let out = a.answer_question("What is CPI?", &ConversationWindow::new()).await;
        assert_eq!(out, CREDENTIAL_MISSING_MESSAGE);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn general_intent_returns_introduction() {
        let (a, llm, _d) = agent(MockLlm::fixed("GENERAL"));
        let out = a.answer_question("hello", &ConversationWindow::new()).await;
        assert_eq!(out, GENERAL_INTRO);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_route_falls_back_to_fact_lookup() {
        // Empty store: fact lookup answers with the sentinel, no second LLM call.
        let (a, llm, _d) = agent(MockLlm::fixed("no idea"));
        let out = a.answer_question("What is the base rate?", &ConversationWindow::new()).await;
        assert_eq!(out, crate::facts::NOT_FOUND_SENTINEL);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn summary_without_news_reports_no_news() {
        let (a, _llm, _d) = agent(MockLlm::fixed("SUMMARY"));
        let out = a.answer_question("Give me a market summary", &ConversationWindow::new()).await;
        assert_eq!(out, crate::report::NO_RECENT_NEWS);
    }
}
