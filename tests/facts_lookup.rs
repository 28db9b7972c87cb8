// tests/facts_lookup.rs

use std::sync::Arc;

use econ_insight_agent::conversation::{ConversationWindow, Role};
use econ_insight_agent::facts::{FactAnswerer, NOT_FOUND_SENTINEL};
use econ_insight_agent::llm::MockLlm;
use econ_insight_agent::prompts::PromptTemplates;
use econ_insight_agent::store::{Chunk, EvidenceGateway, InMemoryStore};

fn answerer(chunks: Vec<Chunk>, llm: Arc<MockLlm>) -> FactAnswerer {
    let gateway = EvidenceGateway::new(Arc::new(InMemoryStore::with_chunks(chunks)));
    FactAnswerer::new(gateway, llm, Arc::new(PromptTemplates::builtin()))
}

#[tokio::test]
async fn empty_store_answers_sentinel_without_llm() {
    let llm = Arc::new(MockLlm::fixed("should not be used"));
    let a = answerer(Vec::new(), llm.clone());
    let out = a
        .lookup_facts("What is UK inflation?", &ConversationWindow::new())
        .await
        .unwrap();
    assert_eq!(out, NOT_FOUND_SENTINEL);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn prompt_carries_context_recent_history_and_date() {
    let llm = Arc::new(MockLlm::echo());
    let a = answerer(
        vec![
            Chunk::news("CPI inflation was 3.4% in May.", "CPI", None, Some(10)),
            Chunk::report("Digest: rates held at 4.25%.", 20),
        ],
        llm.clone(),
    );

    let mut history = ConversationWindow::new();
    for i in 0..5 {
        history.push(Role::User, format!("question {i}"));
        history.push(Role::Assistant, format!("answer {i}"));
    }

    let prompt = a.lookup_facts("What is inflation?", &history).await.unwrap();
    assert!(prompt.contains("CPI inflation was 3.4% in May."));
    assert!(prompt.contains("Digest: rates held at 4.25%."));
    assert!(prompt.contains("Question: What is inflation?"));
    // Only the last three turns survive.
    assert!(!prompt.contains("question 1"));
    assert!(prompt.contains("User: question 2"));
    assert!(prompt.contains("Assistant: answer 4"));
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    assert!(prompt.contains(&today));
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn llm_failure_surfaces_as_error() {
    let a = answerer(
        vec![Chunk::news("x", "x", None, Some(1))],
        Arc::new(MockLlm::failing("timeout")),
    );
    let err = a
        .lookup_facts("anything", &ConversationWindow::new())
        .await
        .unwrap_err();
    assert!(err.is_transient());
}
