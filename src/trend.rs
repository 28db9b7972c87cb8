// src/trend.rs
//! Temporal trend analysis.
//!
//! The most recent agent-generated report is the "old" side of the comparison;
//! news chunks strictly newer than that report are the "new" side. A news item
//! stamped at exactly the anchor's timestamp belongs to the old side, since it
//! is the evidence that produced the anchor.

use std::sync::Arc;

use crate::error::Result;
use crate::llm::DynLlm;
use crate::prompts::{PromptTemplates, PromptVars, TemplateId};
use crate::store::{sort_newest_first, Chunk, ChunkKind, EvidenceGateway, Filter};

pub const NO_PAST_REPORTS: &str = "No past reports found.";
pub const DEFAULT_REPORT_QUERY: &str = "market report economy";
pub const DEFAULT_NEWS_QUERY: &str = "economy inflation";

const REPORT_CANDIDATES: usize = 10;
const NEW_NEWS_LIMIT: usize = 5;
/// Topics at or below this many characters fall back to the whole-economy framing.
const MIN_TOPIC_CHARS: usize = 10;

/// Both sides of a comparison, before the LLM sees them.
#[derive(Debug, Clone)]
pub struct TrendEvidence {
    pub report_query: String,
    pub news_query: String,
    pub anchor: Option<Chunk>,
    /// Unix seconds; 0 when no report exists.
    pub anchor_time: i64,
    /// Store order, not re-sorted.
    pub new_chunks: Vec<Chunk>,
}

impl TrendEvidence {
    pub fn old_context(&self) -> &str {
        self.anchor
            .as_ref()
            .map(|c| c.content.as_str())
            .unwrap_or(NO_PAST_REPORTS)
    }

    pub fn new_context(&self) -> String {
        self.new_chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// `(report_query, news_query)` for an optional topic.
pub fn search_terms(topic: Option<&str>) -> (String, String) {
    match topic.map(str::trim) {
        Some(t) if t.chars().count() > MIN_TOPIC_CHARS => (t.to_string(), t.to_string()),
        _ => (
            DEFAULT_REPORT_QUERY.to_string(),
            DEFAULT_NEWS_QUERY.to_string(),
        ),
    }
}

pub struct TrendAnalyzer {
    gateway: EvidenceGateway,
    llm: DynLlm,
    templates: Arc<PromptTemplates>,
}

impl TrendAnalyzer {
    pub fn new(gateway: EvidenceGateway, llm: DynLlm, templates: Arc<PromptTemplates>) -> Self {
        Self {
            gateway,
            llm,
            templates,
        }
    }

    /// Anchor selection and the strictly-newer news window.
    pub async fn collect_evidence(&self, topic: Option<&str>) -> Result<TrendEvidence> {
        let (report_query, news_query) = search_terms(topic);

        let mut reports = self
            .gateway
            .search(
                &report_query,
                REPORT_CANDIDATES,
                Some(&Filter::kind(ChunkKind::Report)),
            )
            .await?;
        sort_newest_first(&mut reports);
        let anchor = reports.into_iter().next();
        let anchor_time = anchor.as_ref().map(Chunk::timestamp).unwrap_or(0);

        let news_filter =
            Filter::kind(ChunkKind::NewsChunk).and(Filter::timestamp_gt(anchor_time));
        let new_chunks = self
            .gateway
            .search(&news_query, NEW_NEWS_LIMIT, Some(&news_filter))
            .await?;

        tracing::info!(
            target: "trend",
            anchor_time,
            has_anchor = anchor.is_some(),
            new_chunks = new_chunks.len(),
            "trend evidence collected"
        );

        Ok(TrendEvidence {
            report_query,
            news_query,
            anchor,
            anchor_time,
            new_chunks,
        })
    }

    /// "Old vs new" comparison text. The LLM is consulted even when nothing new
    /// was found; the template tells it to report stability in that case.
    pub async fn analyze_trend(&self, topic: Option<&str>) -> Result<String> {
        let evidence = self.collect_evidence(topic).await?;
        let new_context = evidence.new_context();
        let vars: PromptVars = [
            ("old_context", evidence.old_context()),
            ("new_context", new_context.as_str()),
            ("topic", evidence.report_query.as_str()),
        ]
        .into_iter()
        .collect();
        let prompt = self.templates.render(TemplateId::Trend, &vars)?;
        self.llm.complete(&prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_topics_use_economy_fallback() {
        assert_eq!(
            search_terms(Some("inflation")),
            (DEFAULT_REPORT_QUERY.into(), DEFAULT_NEWS_QUERY.into())
        );
        assert_eq!(
            search_terms(None),
            (DEFAULT_REPORT_QUERY.into(), DEFAULT_NEWS_QUERY.into())
        );
        let long = "how has UK inflation moved";
        assert_eq!(search_terms(Some(long)), (long.into(), long.into()));
    }

    #[test]
    fn exactly_ten_chars_is_still_trivial() {
        let (r, _) = search_terms(Some("0123456789"));
        assert_eq!(r, DEFAULT_REPORT_QUERY);
        let (r, _) = search_terms(Some("0123456789a"));
        assert_eq!(r, "0123456789a");
    }

    #[test]
    fn missing_anchor_uses_sentinel() {
        let ev = TrendEvidence {
            report_query: String::new(),
            news_query: String::new(),
            anchor: None,
            anchor_time: 0,
            new_chunks: vec![
                Chunk::news("a", "t", None, Some(1)),
                Chunk::news("b", "t", None, Some(2)),
            ],
        };
        assert_eq!(ev.old_context(), NO_PAST_REPORTS);
        assert_eq!(ev.new_context(), "a\nb");
    }
}
