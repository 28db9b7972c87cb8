//! UK Economic Insight Agent - Binary Entrypoint
//! Boots the Axum HTTP server and the background refresh loop.

use econ_insight_agent::bootstrap::AgentRuntime;
use econ_insight_agent::config::AppConfig;
use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    econ_insight_agent::init_tracing();

    let cfg = AppConfig::load()?;
    let runtime = AgentRuntime::from_config(cfg)?;

    // Dropping the handle detaches the loop; it runs for the life of the process.
    let _ = runtime.start_background();

    Ok(runtime.router().into())
}
