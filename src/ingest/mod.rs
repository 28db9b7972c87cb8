// src/ingest/mod.rs
//! Ingestion pipeline: feeds → articles → chunks → evidence store.
//!
//! Sources are fetched concurrently, one task per source. A source that errors
//! or panics contributes zero articles and never stops the others.

pub mod chunking;
pub mod config;
pub mod entities;
pub mod providers;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::Serialize;

use crate::error::{AgentError, Result};
use crate::ingest::config::FeedSpec;
use crate::ingest::entities::EntityExtractor;
use crate::ingest::providers::RssFeedSource;
use crate::ingest::types::{Article, DocumentSource};
use crate::store::{now_unix, Chunk, EvidenceGateway};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_sources_total", "Sources attempted per ingestion run.");
        describe_counter!("ingest_source_errors_total", "Source fetch/parse failures.");
        describe_counter!("ingest_articles_total", "Articles parsed from sources.");
        describe_counter!("ingest_chunks_total", "Chunks written to the evidence store.");
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
    });
}

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Decode entities, strip tags, ASCII-fy curly quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let stripped = RE_TAGS.replace_all(&decoded, "");
    let quoted = stripped
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    RE_WS.replace_all(&quoted, " ").trim().to_string()
}

/// Outcome of one source in a fan-out run.
#[derive(Debug)]
pub struct SourceResult {
    pub source: String,
    pub articles: Vec<Article>,
    pub error: Option<AgentError>,
}

/// Fetch every source concurrently and collect results in source order.
pub async fn run_fan_out(sources: &[Arc<dyn DocumentSource>]) -> Vec<SourceResult> {
    ensure_metrics_described();
    counter!("ingest_sources_total").increment(sources.len() as u64);

    let handles: Vec<_> = sources
        .iter()
        .map(|src| {
            let src = Arc::clone(src);
            let name = src.name().to_string();
            (name, tokio::spawn(async move { src.fetch_articles().await }))
        })
        .collect();

    let mut out = Vec::with_capacity(handles.len());
    for (name, handle) in handles {
        let reason = match handle.await {
            Ok(Ok(articles)) => {
                tracing::info!(target: "ingest", source = %name, articles = articles.len(), "source fetched");
                out.push(SourceResult {
                    source: name,
                    articles,
                    error: None,
                });
                continue;
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(join) => format!("task aborted: {join}"),
        };
        tracing::warn!(target: "ingest", source = %name, %reason, "source failed");
        counter!("ingest_source_errors_total").increment(1);
        out.push(SourceResult {
            error: Some(AgentError::SourceFetchFailure {
                source_name: name.clone(),
                reason,
            }),
            source: name,
            articles: Vec::new(),
        });
    }
    out
}

/// Split one article into tagged news chunks. Short articles yield nothing.
/// Chunk `source` is the article URL, or the feed name when the item had no link.
pub fn article_chunks(
    article: &Article,
    source: &str,
    entities: &EntityExtractor,
    min_article_chars: usize,
    max_chunk_chars: usize,
) -> Vec<Chunk> {
    if article.text.chars().count() < min_article_chars {
        return Vec::new();
    }
    let tags = entities.extract(&article.text);
    let origin = article.source_url.clone().unwrap_or_else(|| source.to_string());
    // One fetch time for every chunk of an undated article.
    let published_at = article.published_at.unwrap_or_else(now_unix);
    chunking::chunk_text(&article.text, max_chunk_chars)
        .into_iter()
        .map(|piece| {
            Chunk::news(piece, &article.title, Some(origin.clone()), Some(published_at))
                .with_entities(tags.clone())
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub sources: usize,
    pub failed_sources: usize,
    pub articles: usize,
    pub chunks: usize,
}

/// A full ingestion run, as driven by the refresh scheduler.
#[async_trait]
pub trait Ingestor: Send + Sync {
    async fn ingest(&self) -> Result<IngestStats>;
    fn name(&self) -> &str;
}

/// Fetches the configured feeds, chunks the articles and writes them to the store.
pub struct FeedIngestor {
    sources: Vec<Arc<dyn DocumentSource>>,
    gateway: EvidenceGateway,
    entities: Arc<EntityExtractor>,
    min_article_chars: usize,
    max_chunk_chars: usize,
}

impl FeedIngestor {
    pub fn new(sources: Vec<Arc<dyn DocumentSource>>, gateway: EvidenceGateway) -> Self {
        Self {
            sources,
            gateway,
            entities: Arc::new(EntityExtractor::builtin()),
            min_article_chars: 500,
            max_chunk_chars: 1000,
        }
    }

    /// Build RSS sources for `feeds` using the ingest settings.
    pub fn from_feeds(
        feeds: &[FeedSpec],
        cfg: &crate::config::IngestConfig,
        gateway: EvidenceGateway,
    ) -> Result<Self> {
        let mut sources: Vec<Arc<dyn DocumentSource>> = Vec::with_capacity(feeds.len());
        for f in feeds {
            let src = RssFeedSource::from_url(&f.name, &f.url, cfg.http_timeout_secs)
                .map_err(|e| AgentError::Config(format!("feed {}: {e:#}", f.name)))?
                .with_max_articles(cfg.max_articles_per_feed)
                .with_article_body(cfg.fetch_article_body);
            sources.push(Arc::new(src));
        }
        let entities = match &cfg.entities_path {
            Some(p) => EntityExtractor::load_from(p).map_err(|e| AgentError::Config(format!("{e:#}")))?,
            None => EntityExtractor::builtin(),
        };
        Ok(Self::new(sources, gateway)
            .with_entities(entities)
            .with_limits(cfg.min_article_chars, cfg.max_chunk_chars))
    }

    pub fn with_entities(mut self, entities: EntityExtractor) -> Self {
        self.entities = Arc::new(entities);
        self
    }

    pub fn with_limits(mut self, min_article_chars: usize, max_chunk_chars: usize) -> Self {
        self.min_article_chars = min_article_chars;
        self.max_chunk_chars = max_chunk_chars;
        self
    }
}

#[async_trait]
impl Ingestor for FeedIngestor {
    async fn ingest(&self) -> Result<IngestStats> {
        let results = run_fan_out(&self.sources).await;

        let mut stats = IngestStats {
            sources: results.len(),
            ..IngestStats::default()
        };
        let mut chunks = Vec::new();
        for r in &results {
            if r.error.is_some() {
                stats.failed_sources += 1;
                continue;
            }
            stats.articles += r.articles.len();
            for a in &r.articles {
                chunks.extend(article_chunks(
                    a,
                    &r.source,
                    &self.entities,
                    self.min_article_chars,
                    self.max_chunk_chars,
                ));
            }
        }

        stats.chunks = chunks.len();
        if !chunks.is_empty() {
            self.gateway.add_all(chunks).await?;
        }
        counter!("ingest_chunks_total").increment(stats.chunks as u64);
        tracing::info!(
            target: "ingest",
            sources = stats.sources,
            failed = stats.failed_sources,
            articles = stats.articles,
            chunks = stats.chunks,
            "ingestion run complete"
        );
        Ok(stats)
    }

    fn name(&self) -> &str {
        "feeds"
    }
}
