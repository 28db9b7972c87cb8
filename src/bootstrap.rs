// src/bootstrap.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use shuttle_axum::axum::Router;
use tracing::{info, warn};

use crate::agent::InsightAgent;
use crate::api::{self, AppState};
use crate::config::AppConfig;
use crate::ingest::{config::load_feeds, FeedIngestor};
use crate::llm::build_client;
use crate::metrics::Metrics;
use crate::prompts::PromptTemplates;
use crate::report::ReportArchive;
use crate::scheduler::{RefreshScheduler, SchedulerHandle};
use crate::store::{EvidenceGateway, EvidenceStore, InMemoryStore};

/// Everything the service runs on, wired from one [`AppConfig`].
pub struct AgentRuntime {
    pub cfg: AppConfig,
    pub agent: Arc<InsightAgent>,
    pub scheduler: Arc<RefreshScheduler>,
    pub metrics: Option<Metrics>,
}

impl AgentRuntime {
    pub fn from_config(cfg: AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn EvidenceStore> = match &cfg.store.snapshot_path {
            Some(p) => Arc::new(InMemoryStore::open(p.clone()).context("opening evidence snapshot")?),
            None => Arc::new(InMemoryStore::new()),
        };
        let gateway = EvidenceGateway::new(store);

        let templates = match &cfg.prompts.path {
            Some(p) => PromptTemplates::load_from(p)?,
            None => PromptTemplates::builtin(),
        };
        let llm = build_client(&cfg.llm);
        // Safe diagnostics: provider + whether a key is present, never the key.
        info!(
            target: "bootstrap",
            provider = llm.provider_name(),
            configured = llm.is_configured(),
            model = %cfg.llm.model,
            prompts = templates.version(),
            "agent configured"
        );

        let agent = Arc::new(InsightAgent::new(
            gateway.clone(),
            llm.clone(),
            Arc::new(templates),
            ReportArchive::new(cfg.reports.dir.clone()),
        ));

        let feeds = load_feeds(cfg.ingest.feeds_path.as_deref())?;
        let ingestor = FeedIngestor::from_feeds(&feeds, &cfg.ingest, gateway)?;
        let mut scheduler = RefreshScheduler::new(Arc::new(ingestor))
            .with_interval(Duration::from_secs(cfg.refresh.interval_secs));
        if cfg.refresh.auto_report && llm.is_configured() {
            scheduler = scheduler.with_auto_report(agent.reports());
        } else {
            warn!(target: "bootstrap", "auto-report after refresh is off");
        }

        let metrics = cfg
            .api
            .metrics
            .then(|| Metrics::init(cfg.refresh.interval_secs));

        Ok(Self {
            cfg,
            agent,
            scheduler: Arc::new(scheduler),
            metrics,
        })
    }

    pub fn state(&self) -> AppState {
        AppState::new(self.agent.clone(), self.scheduler.clone())
    }

    pub fn router(&self) -> Router {
        api::router(self.state(), self.metrics.as_ref())
    }

    /// Start the background refresh loop when enabled in config.
    pub fn start_background(&self) -> Option<SchedulerHandle> {
        if !self.cfg.refresh.background {
            info!(target: "bootstrap", "background refresh disabled; passive checks only");
            return None;
        }
        Some(
            self.scheduler
                .clone()
                .spawn(Duration::from_secs(self.cfg.refresh.tick_secs)),
        )
    }
}
