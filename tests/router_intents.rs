// tests/router_intents.rs

use std::sync::Arc;

use econ_insight_agent::llm::MockLlm;
use econ_insight_agent::prompts::PromptTemplates;
use econ_insight_agent::router::IntentRouter;
use econ_insight_agent::{AgentError, Intent};

fn router(llm: MockLlm) -> IntentRouter {
    IntentRouter::new(Arc::new(llm), Arc::new(PromptTemplates::builtin()))
}

#[tokio::test]
async fn noisy_output_still_routes() {
    let r = router(MockLlm::fixed("The category is: TREND_ANALYSIS"));
    assert_eq!(r.classify("How has inflation changed?").await, Intent::TrendAnalysis);
}

#[tokio::test]
async fn unusable_output_defaults_to_fact_lookup() {
    for reply in ["", "   ", "I think it's a trend question", "trend_analysis"] {
        let r = router(MockLlm::fixed(reply));
        assert_eq!(r.classify("q").await, Intent::FactLookup, "reply {reply:?}");
    }
}

#[tokio::test]
async fn unavailable_or_failing_llm_defaults_to_fact_lookup() {
    assert_eq!(router(MockLlm::unavailable()).classify("q").await, Intent::FactLookup);
    assert_eq!(router(MockLlm::failing("503")).classify("q").await, Intent::FactLookup);
}

#[tokio::test]
async fn try_classify_reports_ambiguity() {
    let err = router(MockLlm::fixed("no idea")).try_classify("q").await.unwrap_err();
    assert!(matches!(err, AgentError::ClassificationAmbiguous(raw) if raw == "no idea"));
}

#[tokio::test]
async fn question_is_placed_in_router_prompt() {
    let llm = Arc::new(MockLlm::fixed("SUMMARY"));
    let r = IntentRouter::new(llm.clone(), Arc::new(PromptTemplates::builtin()));
    assert_eq!(r.classify("Give me today's market summary").await, Intent::Summary);
    assert!(llm
        .last_prompt()
        .unwrap()
        .contains("Question: Give me today's market summary"));
}
