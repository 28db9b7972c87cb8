// src/store/filter.rs
//! Typed metadata filters for evidence searches.
//!
//! Build with [`Filter`]:
//! ```
//! use econ_insight_agent::store::{ChunkKind, Filter};
//! let f = Filter::kind(ChunkKind::NewsChunk).and(Filter::timestamp_gt(1_700_000_000));
//! assert_eq!(f.clauses().len(), 2);
//! ```

use serde_json::{json, Value};

use super::{ChunkKind, ChunkMetadata};

/// A filter over chunk metadata: equality on `type`, `>`/`>=` on `timestamp`,
/// and conjunction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    KindIs(ChunkKind),
    TimestampGt(i64),
    TimestampGte(i64),
    And(Vec<FilterExpr>),
}

/// Entry points for building a [`FilterExpr`].
pub struct Filter;

impl Filter {
    pub fn kind(kind: ChunkKind) -> FilterExpr {
        FilterExpr::KindIs(kind)
    }

    /// Strictly newer than `ts`.
    pub fn timestamp_gt(ts: i64) -> FilterExpr {
        FilterExpr::TimestampGt(ts)
    }

    pub fn timestamp_gte(ts: i64) -> FilterExpr {
        FilterExpr::TimestampGte(ts)
    }
}

impl FilterExpr {
    /// Conjunction. Nested `And`s are flattened.
    pub fn and(self, other: FilterExpr) -> FilterExpr {
        let mut clauses = match self {
            FilterExpr::And(v) => v,
            single => vec![single],
        };
        match other {
            FilterExpr::And(v) => clauses.extend(v),
            single => clauses.push(single),
        }
        FilterExpr::And(clauses)
    }

    /// Leaf clauses (a non-`And` expression is its own single clause).
    pub fn clauses(&self) -> Vec<&FilterExpr> {
        match self {
            FilterExpr::And(v) => v.iter().flat_map(|c| c.clauses()).collect(),
            leaf => vec![leaf],
        }
    }

    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        match self {
            FilterExpr::KindIs(k) => meta.kind == *k,
            FilterExpr::TimestampGt(ts) => meta.timestamp > *ts,
            FilterExpr::TimestampGte(ts) => meta.timestamp >= *ts,
            FilterExpr::And(v) => v.iter().all(|c| c.matches(meta)),
        }
    }

    /// Render as a Chroma-style `where` document for remote vector indexes.
    pub fn to_where_clause(&self) -> Value {
        match self {
            FilterExpr::KindIs(k) => json!({ "type": { "$eq": k.as_str() } }),
            FilterExpr::TimestampGt(ts) => json!({ "timestamp": { "$gt": ts } }),
            FilterExpr::TimestampGte(ts) => json!({ "timestamp": { "$gte": ts } }),
            FilterExpr::And(v) if v.len() == 1 => v[0].to_where_clause(),
            FilterExpr::And(v) => {
                json!({ "$and": v.iter().map(|c| c.to_where_clause()).collect::<Vec<_>>() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(kind: ChunkKind, ts: i64) -> ChunkMetadata {
        ChunkMetadata {
            kind,
            source: None,
            title: "t".into(),
            date: "2025-01-01".into(),
            timestamp: ts,
            entities: None,
        }
    }

    #[test]
    fn strict_gt_excludes_equal_timestamp() {
        let f = Filter::kind(ChunkKind::NewsChunk).and(Filter::timestamp_gt(100));
        assert!(!f.matches(&meta(ChunkKind::NewsChunk, 100)));
        assert!(f.matches(&meta(ChunkKind::NewsChunk, 101)));
        assert!(!f.matches(&meta(ChunkKind::Report, 101)));
    }

    #[test]
    fn gte_includes_equal_timestamp() {
        assert!(Filter::timestamp_gte(100).matches(&meta(ChunkKind::Report, 100)));
    }

    #[test]
    fn and_flattens_nested_conjunctions() {
        let f = Filter::kind(ChunkKind::Report)
            .and(Filter::timestamp_gt(1))
            .and(Filter::timestamp_gte(2));
        match &f {
            FilterExpr::And(v) => assert_eq!(v.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn where_clause_uses_chroma_operators() {
        let f = Filter::kind(ChunkKind::NewsChunk).and(Filter::timestamp_gt(42));
        let v = f.to_where_clause();
        assert_eq!(v["$and"][0]["type"]["$eq"], "news_chunk");
        assert_eq!(v["$and"][1]["timestamp"]["$gt"], 42);

        let single = Filter::kind(ChunkKind::Report).to_where_clause();
        assert_eq!(single["type"]["$eq"], "report");
    }
}
