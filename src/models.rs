use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::search::filter::MetadataFilter;

/// Metadata attached to a passage by the external chunker.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PassageMetadata {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub chunk_index: usize,
    #[serde(default)]
    pub doc_type: String,
    /// Any further keys the chunker emitted, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PassageMetadata {
    /// Textual form of a metadata value, used for filter equality.
    ///
    /// Returns `None` for absent keys and for non-scalar values.
    pub fn value_text(&self, key: &str) -> Option<String> {
        match key {
            "source" => Some(self.source.clone()),
            "chunk_index" => Some(self.chunk_index.to_string()),
            "doc_type" => Some(self.doc_type.clone()),
            other => match self.extra.get(other)? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(crate::search::filter::number_text(n)),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            },
        }
    }
}

/// A single immutable passage from the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PassageRecord {
    pub id: String,
    pub content: String,
    pub metadata: PassageMetadata,
}

/// A passage with the score assigned by whichever stage produced it.
#[derive(Debug, Clone)]
pub struct ScoredPassage {
    pub passage: Arc<PassageRecord>,
    pub score: f32,
}

/// Canonical, typed search parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub query: String,
    pub top_k: usize,
    pub w_semantic: f32,
    pub w_keyword: f32,
    pub filter: MetadataFilter,
}

pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_W_SEMANTIC: f32 = 0.7;
pub const DEFAULT_W_KEYWORD: f32 = 0.3;

impl SearchParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: DEFAULT_TOP_K,
            w_semantic: DEFAULT_W_SEMANTIC,
            w_keyword: DEFAULT_W_KEYWORD,
            filter: MetadataFilter::default(),
        }
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn weights(mut self, w_semantic: f32, w_keyword: f32) -> Self {
        self.w_semantic = w_semantic;
        self.w_keyword = w_keyword;
        self
    }

    pub fn filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Retrieval strategy for the A/B endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Semantic,
    Keyword,
    Hybrid,
    /// Picks `Semantic` or `Hybrid` uniformly at random per request.
    #[default]
    Auto,
}

/// Search request as received at the HTTP boundary.
///
/// Numeric fields are kept loosely typed (`5` and `"5"` are both accepted)
/// and canonicalized by [`crate::cache::key::canonicalize`].
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default, deserialize_with = "present")]
    pub top_k: Option<Value>,
    #[serde(default)]
    pub metadata_filter: Option<BTreeMap<String, Value>>,
    #[serde(default, deserialize_with = "present")]
    pub w_semantic: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub w_keyword: Option<Value>,
    /// Only read by the A/B endpoint.
    #[serde(default)]
    pub strategy: Option<Strategy>,
}

/// Keeps an explicit `null` as `Some(Value::Null)` so it can be told apart
/// from an absent field.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// A single result row returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub source: String,
    pub chunk_index: usize,
    pub content: String,
    pub score: f32,
}

impl From<&ScoredPassage> for SearchHit {
    fn from(scored: &ScoredPassage) -> Self {
        Self {
            source: scored.passage.metadata.source.clone(),
            chunk_index: scored.passage.metadata.chunk_index,
            content: scored.passage.content.clone(),
            score: scored.score,
        }
    }
}

/// Search response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
}

/// A/B search response: reports which strategy actually ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbTestResponse {
    pub query: String,
    pub strategy_used: Strategy,
    pub results: Vec<SearchHit>,
}
