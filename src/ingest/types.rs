// src/ingest/types.rs
use anyhow::Result;

/// One article as yielded by a document source.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Article {
    pub text: String,             // normalized body; paragraphs separated by "\n\n"
    pub source_url: Option<String>,
    pub title: String,
    pub published_at: Option<i64>, // unix seconds, when the feed carries one
}

#[async_trait::async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch_articles(&self) -> Result<Vec<Article>>;
    fn name(&self) -> &str;
}
