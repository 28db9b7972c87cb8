// src/store/mod.rs
//! Evidence store: chunk data model, the external index seam, and the typed
//! gateway the reasoning components query through.

pub mod filter;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, TimeZone};
use metrics::counter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

pub use filter::{Filter, FilterExpr};
pub use memory::InMemoryStore;

/// Kind of evidence. Serialized with the index's metadata vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkKind {
    #[serde(rename = "news_chunk")]
    NewsChunk,
    #[serde(rename = "report")]
    Report,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::NewsChunk => "news_chunk",
            ChunkKind::Report => "report",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(rename = "type")]
    pub kind: ChunkKind,
    pub source: Option<String>,
    pub title: String,
    /// Local calendar date, `YYYY-MM-DD`.
    pub date: String,
    /// Unix seconds; always populated.
    pub timestamp: i64,
    /// `{organizations, people, locations}` when extraction ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<serde_json::Value>,
}

/// Unit of retrievable evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// A news chunk. Missing publish time falls back to `now`.
    pub fn news(
        content: impl Into<String>,
        title: impl Into<String>,
        source: Option<String>,
        published_at: Option<i64>,
    ) -> Self {
        let timestamp = published_at.unwrap_or_else(now_unix);
        Self {
            content: content.into(),
            metadata: ChunkMetadata {
                kind: ChunkKind::NewsChunk,
                source,
                title: title.into(),
                date: local_date(timestamp),
                timestamp,
                entities: None,
            },
        }
    }

    /// An agent-generated report stamped at `timestamp`.
    pub fn report(content: impl Into<String>, timestamp: i64) -> Self {
        let date = local_date(timestamp);
        Self {
            content: content.into(),
            metadata: ChunkMetadata {
                kind: ChunkKind::Report,
                source: Some("Agent Generated".to_string()),
                title: format!("Market Report {date}"),
                date,
                timestamp,
                entities: None,
            },
        }
    }

    pub fn with_entities(mut self, entities: serde_json::Value) -> Self {
        self.metadata.entities = Some(entities);
        self
    }

    pub fn kind(&self) -> ChunkKind {
        self.metadata.kind
    }

    pub fn timestamp(&self) -> i64 {
        self.metadata.timestamp
    }

    /// Stable content fingerprint (hex SHA-256 over kind, timestamp, source and content).
    pub fn id(&self) -> String {
        let mut h = Sha256::new();
        h.update(self.metadata.kind.as_str().as_bytes());
        h.update(self.metadata.timestamp.to_be_bytes());
        h.update(self.metadata.source.as_deref().unwrap_or_default().as_bytes());
        h.update([0u8]);
        h.update(self.content.as_bytes());
        h.finalize().iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// The external similarity index. Implementations rank by their own notion of
/// similarity and must apply `filter` before truncating to `k`.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&FilterExpr>,
    ) -> Result<Vec<Chunk>>;

    /// Append-only insert. Re-adding a chunk with an existing [`Chunk::id`] is a no-op.
    async fn add(&self, chunks: Vec<Chunk>) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Typed query interface used by the reasoning components.
#[derive(Clone)]
pub struct EvidenceGateway {
    store: Arc<dyn EvidenceStore>,
}

impl EvidenceGateway {
    pub fn new(store: Arc<dyn EvidenceStore>) -> Self {
        Self { store }
    }

    /// Similarity search, ordered by the store's ranking. Nothing matching is
    /// `Ok(vec![])`, not an error.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&FilterExpr>,
    ) -> Result<Vec<Chunk>> {
        let k = k.max(1);
        let mut hits = self.store.search(query, k, filter).await.inspect_err(|e| {
            counter!("store_errors_total").increment(1);
            tracing::warn!(target: "store", store = self.store.name(), error = %e, "search failed");
        })?;
        hits.truncate(k);
        tracing::debug!(
            target: "store",
            store = self.store.name(),
            k,
            hits = hits.len(),
            filtered = filter.is_some(),
            "search"
        );
        Ok(hits)
    }

    pub async fn add(&self, chunk: Chunk) -> Result<()> {
        self.add_all(vec![chunk]).await
    }

    pub async fn add_all(&self, chunks: Vec<Chunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let n = chunks.len();
        self.store.add(chunks).await?;
        counter!("store_chunks_added_total").increment(n as u64);
        Ok(())
    }
}

/// Sort newest first by `timestamp`. Stable for equal timestamps.
pub fn sort_newest_first(chunks: &mut [Chunk]) {
    chunks.sort_by(|a, b| b.metadata.timestamp.cmp(&a.metadata.timestamp));
}

pub(crate) fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

pub(crate) fn local_date(ts: i64) -> String {
    Local
        .timestamp_opt(ts, 0)
        .single()
        .unwrap_or_else(Local::now)
        .format("%Y-%m-%d")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn news_without_publish_time_gets_ingestion_time() {
        let before = now_unix();
        let c = Chunk::news("body", "title", None, None);
        assert!(c.timestamp() >= before);
        assert_eq!(c.kind(), ChunkKind::NewsChunk);
        assert_eq!(c.metadata.date.len(), 10);
    }

    #[test]
    fn metadata_serializes_with_index_vocabulary() {
        let c = Chunk::report("digest", 1_700_000_000);
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["metadata"]["type"], "report");
        assert_eq!(v["metadata"]["source"], "Agent Generated");
        assert!(v["metadata"].get("entities").is_none());
    }

    #[test]
    fn newest_first_sort() {
        let mut v = vec![
            Chunk::report("a", 10),
            Chunk::report("c", 30),
            Chunk::report("b", 20),
        ];
        sort_newest_first(&mut v);
        let order: Vec<_> = v.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(order, ["c", "b", "a"]);
    }

    #[test]
    fn id_depends_on_content_and_time() {
        let a = Chunk::report("digest", 1);
        assert_eq!(a.id(), Chunk::report("digest", 1).id());
        assert_ne!(a.id(), Chunk::report("digest", 2).id());
        assert_ne!(a.id(), Chunk::report("digest!", 1).id());
        assert_eq!(a.id().len(), 64);
    }
}
