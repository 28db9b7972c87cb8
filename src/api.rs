use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::agent::InsightAgent;
use crate::conversation::{ConversationWindow, Message};
use crate::error::AgentError;
use crate::metrics::Metrics;
use crate::report::{ReportFile, NO_RECENT_NEWS};
use crate::scheduler::{RefreshOutcome, RefreshScheduler};

/// Shown for the next run while a refresh is pending.
pub const NEXT_RUN_PENDING: &str = "Pending...";

#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<InsightAgent>,
    pub scheduler: Arc<RefreshScheduler>,
}

impl AppState {
    pub fn new(agent: Arc<InsightAgent>, scheduler: Arc<RefreshScheduler>) -> Self {
        Self { agent, scheduler }
    }
}

pub fn router(state: AppState, metrics: Option<&Metrics>) -> Router {
    let mut app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/ask", post(ask))
        .route("/reports", get(list_reports).post(create_report))
        .route("/reports/{name}", get(read_report))
        .route("/refresh", get(refresh_status).post(force_refresh));
    if let Some(m) = metrics {
        app = app.merge(m.router());
    }
    app.layer(CorsLayer::very_permissive()).with_state(state)
}

/// Error body: `{"error": "..."}` with a status derived from the error kind.
pub struct ApiError(AgentError);

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AgentError::CredentialMissing => StatusCode::SERVICE_UNAVAILABLE,
            AgentError::TransientServiceFailure(_) | AgentError::SourceFetchFailure { .. } => {
                StatusCode::BAD_GATEWAY
            }
            AgentError::Config(_) => StatusCode::BAD_REQUEST,
            AgentError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!(target: "api", status = status.as_u16(), error = %self.0, "request failed");
        let body = serde_json::json!({ "error": self.0.user_message() });
        (status, Json(body)).into_response()
    }
}

#[derive(Deserialize)]
struct AskReq {
    query: String,
    #[serde(default)]
    history: Vec<Message>,
}

#[derive(Serialize)]
struct AskResp {
    answer: String,
    /// True when this request triggered an ingestion run.
    refreshed: bool,
}

async fn ask(State(state): State<AppState>, Json(body): Json<AskReq>) -> Response {
    let query = body.query.trim();
    if query.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": "query is empty" })))
            .into_response();
    }

    // Every interaction doubles as a passive refresh check.
    let refreshed = match state.scheduler.check_and_refresh().await {
        Ok(outcome) => outcome.refreshed(),
        Err(e) => {
            tracing::warn!(target: "api", error = %e, "passive refresh failed");
            false
        }
    };

    let history = ConversationWindow::from_messages(body.history);
    let answer = state.agent.answer_question(query, &history).await;
    Json(AskResp { answer, refreshed }).into_response()
}

#[derive(Serialize)]
struct ReportResp {
    report: String,
    path: Option<String>,
    reindexed: bool,
}

async fn create_report(State(state): State<AppState>) -> Result<Response, ApiError> {
    let resp = match state.agent.reports().generate_and_save().await? {
        Some((report, saved)) => (
            StatusCode::CREATED,
            Json(ReportResp {
                report,
                path: Some(saved.path.display().to_string()),
                reindexed: saved.reindexed,
            }),
        ),
        None => (
            StatusCode::OK,
            Json(ReportResp {
                report: NO_RECENT_NEWS.to_string(),
                path: None,
                reindexed: false,
            }),
        ),
    };
    Ok(resp.into_response())
}

async fn list_reports(State(state): State<AppState>) -> Result<Json<Vec<ReportFile>>, ApiError> {
    Ok(Json(state.agent.reports().archive().list()?))
}

async fn read_report(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let text = state.agent.reports().archive().read(&name)?;
    Ok(([(header::CONTENT_TYPE, "text/markdown; charset=utf-8")], text).into_response())
}

#[derive(Serialize)]
struct RefreshStatus {
    last_updated: Option<String>,
    next_run: String,
    interval_secs: u64,
}

async fn refresh_status(State(state): State<AppState>) -> Json<RefreshStatus> {
    let s = &state.scheduler;
    let fmt = |t: chrono::DateTime<chrono::Local>| t.format("%Y-%m-%d %H:%M:%S").to_string();
    Json(RefreshStatus {
        last_updated: s.last_ingestion_time().await.map(fmt),
        next_run: s
            .next_run()
            .await
            .map(fmt)
            .unwrap_or_else(|| NEXT_RUN_PENDING.to_string()),
        interval_secs: s.interval().as_secs(),
    })
}

async fn force_refresh(State(state): State<AppState>) -> Result<Json<RefreshOutcome>, ApiError> {
    Ok(Json(state.scheduler.force_refresh().await?))
}
