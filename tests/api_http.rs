// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

use std::sync::Arc;

use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use econ_insight_agent::agent::{InsightAgent, GENERAL_INTRO};
use econ_insight_agent::api::{self, AppState, NEXT_RUN_PENDING};
use econ_insight_agent::llm::MockLlm;
use econ_insight_agent::prompts::PromptTemplates;
use econ_insight_agent::report::{ReportArchive, NO_RECENT_NEWS};
use econ_insight_agent::scheduler::{MockIngestor, RefreshScheduler};
use econ_insight_agent::store::{EvidenceGateway, InMemoryStore};

const BODY_LIMIT: usize = 1024 * 1024;

struct TestApp {
    router: Router,
    ingestor: Arc<MockIngestor>,
    _reports: tempfile::TempDir,
}

fn test_app(llm: MockLlm) -> TestApp {
    let reports = tempfile::tempdir().unwrap();
    let agent = Arc::new(InsightAgent::new(
        EvidenceGateway::new(Arc::new(InMemoryStore::new())),
        Arc::new(llm),
        Arc::new(PromptTemplates::builtin()),
        ReportArchive::new(reports.path()),
    ));
    let ingestor = Arc::new(MockIngestor::new());
    let scheduler = Arc::new(RefreshScheduler::new(ingestor.clone()));
    TestApp {
        router: api::router(AppState::new(agent, scheduler), None),
        ingestor,
        _reports: reports,
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    (status, bytes.to_vec())
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let app = test_app(MockLlm::echo());
    let (status, body) = send(&app.router, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn ask_routes_and_runs_passive_refresh_once() {
    let app = test_app(MockLlm::fixed("GENERAL"));

    let (status, body) = send(&app.router, post_json("/ask", r#"{"query":"hi there"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["answer"], GENERAL_INTRO);
    assert_eq!(v["refreshed"], true);

    let req = post_json(
        "/ask",
        r#"{"query":"and again","history":[{"role":"user","content":"hi"},{"role":"assistant","content":"hello"}]}"#,
    );
    let (_, body) = send(&app.router, req).await;
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["refreshed"], false);
    assert_eq!(app.ingestor.calls(), 1);
}

#[tokio::test]
async fn blank_query_is_rejected() {
    let app = test_app(MockLlm::echo());
    let (status, _) = send(&app.router, post_json("/ask", r#"{"query":"   "}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.ingestor.calls(), 0);
}

#[tokio::test]
async fn refresh_status_then_force() {
    let app = test_app(MockLlm::echo());

    let (status, body) = send(&app.router, Request::get("/refresh").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["next_run"], NEXT_RUN_PENDING);
    assert!(v["last_updated"].is_null());
    assert_eq!(v["interval_secs"], 3600);

    for _ in 0..2 {
        let (status, body) = send(&app.router, Request::post("/refresh").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let v: Json = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["status"], "refreshed");
        assert_eq!(v["report"]["status"], "skipped");
    }
    assert_eq!(app.ingestor.calls(), 2);

    let (_, body) = send(&app.router, Request::get("/refresh").body(Body::empty()).unwrap()).await;
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert!(v["last_updated"].is_string());
    assert_ne!(v["next_run"], NEXT_RUN_PENDING);
}

#[tokio::test]
async fn reports_endpoints_with_empty_store() {
    let app = test_app(MockLlm::echo());

    let (status, body) = send(&app.router, Request::post("/reports").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["report"], NO_RECENT_NEWS);
    assert!(v["path"].is_null());

    let (status, body) = send(&app.router, Request::get("/reports").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<Json>(&body).unwrap(), serde_json::json!([]));

    let (status, _) = send(
        &app.router,
        Request::get("/reports/missing.md").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app.router,
        Request::get("/reports/notes.txt").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_credential_is_reported_in_the_answer() {
    let app = test_app(MockLlm::unavailable());
    let (status, body) = send(&app.router, post_json("/ask", r#"{"query":"What is CPI?"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["answer"], econ_insight_agent::error::CREDENTIAL_MISSING_MESSAGE);
}
