// src/store/memory.rs
//! In-process evidence store with lexical similarity ranking and optional JSON
//! snapshot persistence. Behaves like a vector index: it always returns the
//! `k` nearest chunks that pass the filter, however weak the match.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::RwLock;

use super::{Chunk, EvidenceStore, FilterExpr};
use crate::error::{AgentError, Result};

static RE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?u)\b\w+\b").expect("word regex"));

/// Weight of the fuzzy title match relative to the body cosine.
const TITLE_BONUS: f32 = 0.15;

#[derive(Default)]
pub struct InMemoryStore {
    chunks: RwLock<Vec<Chunk>>,
    snapshot: Option<PathBuf>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store persisted at `path`; a missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let chunks = match std::fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(
            target: "store",
            path = %path.display(),
            chunks = chunks.len(),
            "evidence snapshot loaded"
        );
        Ok(Self {
            chunks: RwLock::new(chunks),
            snapshot: Some(path),
        })
    }

    pub fn with_chunks(chunks: Vec<Chunk>) -> Self {
        Self {
            chunks: RwLock::new(chunks),
            snapshot: None,
        }
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }

    pub async fn all(&self) -> Vec<Chunk> {
        self.chunks.read().await.clone()
    }
}

#[async_trait]
impl EvidenceStore for InMemoryStore {
    async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&FilterExpr>,
    ) -> Result<Vec<Chunk>> {
        let q = term_freq(query);
        let query_lc = query.to_lowercase();
        let guard = self.chunks.read().await;

        let mut scored: Vec<(f32, usize)> = guard
            .iter()
            .enumerate()
            .filter(|(_, c)| filter.map(|f| f.matches(&c.metadata)).unwrap_or(true))
            .map(|(i, c)| (similarity(&q, &query_lc, c), i))
            .collect();

        // Highest score first; insertion order breaks ties.
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, i)| guard[i].clone())
            .collect())
    }

    /// With a snapshot the new chunks become searchable only after the file
    /// is written, so a failed write leaves memory and disk unchanged.
    async fn add(&self, chunks: Vec<Chunk>) -> Result<()> {
        let mut guard = self.chunks.write().await;
        let mut seen: HashSet<String> = guard.iter().map(Chunk::id).collect();
        let fresh: Vec<Chunk> = chunks.into_iter().filter(|c| seen.insert(c.id())).collect();
        if fresh.is_empty() {
            return Ok(());
        }
        let Some(path) = &self.snapshot else {
            guard.extend(fresh);
            return Ok(());
        };

        let mut next = Vec::with_capacity(guard.len() + fresh.len());
        next.extend(guard.iter().cloned());
        next.extend(fresh);
        write_snapshot(path, &next).await.inspect_err(|e| {
            tracing::warn!(target: "store", path = %path.display(), error = %e, "snapshot write failed; chunks not added");
        })?;
        *guard = next;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

fn term_freq(text: &str) -> HashMap<String, f32> {
    let mut tf = HashMap::new();
    for m in RE_WORD.find_iter(text) {
        let w = m.as_str().to_lowercase();
        if w.chars().count() < 2 {
            continue;
        }
        *tf.entry(w).or_insert(0.0) += 1.0;
    }
    tf
}

fn cosine(a: &HashMap<String, f32>, b: &HashMap<String, f32>) -> f32 {
    let dot: f32 = a
        .iter()
        .filter_map(|(k, va)| b.get(k).map(|vb| va * vb))
        .sum();
    let na: f32 = a.values().map(|v| v * v).sum::<f32>().sqrt();
    let nb: f32 = b.values().map(|v| v * v).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

fn similarity(q: &HashMap<String, f32>, query_lc: &str, chunk: &Chunk) -> f32 {
    let body = term_freq(&format!("{} {}", chunk.metadata.title, chunk.content));
    let title = strsim::jaro_winkler(query_lc, &chunk.metadata.title.to_lowercase()) as f32;
    cosine(q, &body) + TITLE_BONUS * title
}

/// Write to `<path>.tmp`, then rename over `path`. The tmp file is removed
/// when any step after its creation fails.
async fn write_snapshot(path: &Path, chunks: &[Chunk]) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(dir).await?;
        }
    }
    let json = serde_json::to_vec(chunks)?;
    let tmp = path.with_extension("json.tmp");
    let written = match tokio::fs::write(&tmp, &json).await {
        Ok(()) => tokio::fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(AgentError::from(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChunkKind, Filter};

    #[tokio::test]
    async fn ranks_lexical_overlap_first() {
        let store = InMemoryStore::with_chunks(vec![
            Chunk::news("Housing market cools as mortgage rates rise", "Housing", None, Some(1)),
            Chunk::news("Inflation rises to 3.1% says ONS", "Inflation data", None, Some(2)),
        ]);
        let hits = store.search("inflation figures", 2, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].content.contains("Inflation"));
    }

    #[tokio::test]
    async fn filter_applies_before_k() {
        let store = InMemoryStore::with_chunks(vec![
            Chunk::report("inflation inflation inflation", 5),
            Chunk::news("unrelated", "x", None, Some(6)),
        ]);
        let f = Filter::kind(ChunkKind::NewsChunk);
        let hits = store.search("inflation", 1, Some(&f)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind(), ChunkKind::NewsChunk);
    }

    #[tokio::test]
    async fn identical_chunks_are_stored_once() {
        let store = InMemoryStore::new();
        let c = Chunk::news("Rates held at 4.25%", "Rates", Some("bbc".into()), Some(10));
        store.add(vec![c.clone()]).await.unwrap();
        store.add(vec![c.clone(), c]).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn empty_store_returns_empty_not_error() {
        let store = InMemoryStore::new();
        assert!(store.search("anything", 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_snapshot_write_adds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let store = InMemoryStore::open(data.join("evidence.json")).unwrap();
        // The snapshot directory cannot be created over a plain file.
        std::fs::write(&data, "not a directory").unwrap();

        let err = store
            .add(vec![Chunk::report("digest text", 1_700_000_000)])
            .await;
        assert!(err.is_err());
        assert!(store.is_empty().await);
        assert!(store.search("digest", 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_rename_removes_tmp_and_keeps_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evidence.json");
        let store = InMemoryStore::open(&path).unwrap();
        store
            .add(vec![Chunk::report("first", 1)])
            .await
            .unwrap();
        // Renaming a file over a directory fails.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(store.add(vec![Chunk::report("second", 2)]).await.is_err());
        assert!(!dir.path().join("evidence.json.tmp").exists());
        let all = store.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, "first");
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evidence.json");

        let store = InMemoryStore::open(&path).unwrap();
        store
            .add(vec![Chunk::report("BoE holds at 5.25%", 1_700_000_000)])
            .await
            .unwrap();

        let reopened = InMemoryStore::open(&path).unwrap();
        let all = reopened.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, "BoE holds at 5.25%");
    }
}
