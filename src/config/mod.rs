// src/config/mod.rs
//! Application configuration: `config/agent.toml` (or `$AGENT_CONFIG_PATH`)
//! with serde defaults for every field, then environment overrides.

pub mod llm;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use llm::LlmConfig;

pub const ENV_CONFIG_PATH: &str = "AGENT_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/agent.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub refresh: RefreshConfig,
    pub reports: ReportsConfig,
    pub store: StoreConfig,
    pub ingest: IngestConfig,
    pub prompts: PromptsConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Ingestion is due again once this much time has passed.
    pub interval_secs: u64,
    /// Background loop tick; each tick runs the passive due-check.
    pub tick_secs: u64,
    pub background: bool,
    /// Chain a digest report after every successful refresh.
    pub auto_report: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            tick_secs: 60,
            background: true,
            auto_report: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    pub dir: PathBuf,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("reports"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot of the in-process evidence store. `None` keeps it in memory.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: Some(PathBuf::from("data/evidence.json")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Feed list file (TOML `feeds = [...]` or JSON array). Built-in list when unset.
    pub feeds_path: Option<PathBuf>,
    pub max_articles_per_feed: usize,
    /// Articles shorter than this are skipped.
    pub min_article_chars: usize,
    pub max_chunk_chars: usize,
    /// Download the linked article page instead of using the feed summary.
    pub fetch_article_body: bool,
    pub http_timeout_secs: u64,
    /// Gazetteer for best-effort entity extraction.
    pub entities_path: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            feeds_path: None,
            max_articles_per_feed: 5,
            min_article_chars: 500,
            max_chunk_chars: 1000,
            fetch_article_body: true,
            http_timeout_secs: 10,
            entities_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Optional TOML overriding the built-in templates.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub metrics: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

impl AppConfig {
    /// Load using env var + fallbacks:
    /// 1) $AGENT_CONFIG_PATH (must exist)
    /// 2) config/agent.toml
    /// 3) built-in defaults
    pub fn load() -> Result<Self> {
        let cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default.exists() {
                Self::load_from(&default)?
            } else {
                Self::default()
            }
        };
        Ok(cfg.with_env_overrides())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading agent config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing agent config {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: AppConfig = toml::from_str(s)?;
        Ok(cfg)
    }

    /// Apply env overrides and resolve the LLM credential.
    pub fn with_env_overrides(mut self) -> Self {
        self.llm = self.llm.resolve();
        if let Some(secs) = std::env::var("REFRESH_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            self.refresh.interval_secs = secs;
        }
        if let Ok(dir) = std::env::var("REPORTS_DIR") {
            if !dir.trim().is_empty() {
                self.reports.dir = PathBuf::from(dir.trim());
            }
        }
        // Keep the loop and interval sane.
        self.refresh.interval_secs = self.refresh.interval_secs.max(1);
        self.refresh.tick_secs = self.refresh.tick_secs.max(1);
        self
    }
}
