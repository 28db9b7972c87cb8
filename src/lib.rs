// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod agent;
pub mod api;
pub mod bootstrap;
pub mod config;
pub mod conversation;
pub mod error;
pub mod facts;
pub mod ingest;
pub mod llm;
pub mod metrics;
pub mod prompts;
pub mod report;
pub mod router;
pub mod scheduler;
pub mod store;
pub mod trend;

// ---- Re-exports for stable public API ----
pub use crate::agent::InsightAgent;
pub use crate::error::{AgentError, Result};
pub use crate::router::Intent;
pub use crate::scheduler::{RefreshOutcome, RefreshScheduler};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber. `RUST_LOG` wins over the default
/// filter; `LOG_FORMAT=json` switches to JSON lines. Safe to call twice.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("econ_insight_agent=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
