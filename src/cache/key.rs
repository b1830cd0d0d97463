//! Request canonicalization and result-cache keys.
//!
//! Requests arrive loosely typed (`"5"` and `5` are both a valid `top_k`).
//! Canonicalization turns them into [`SearchParams`]; logically-equal
//! requests always produce equal params and therefore equal [`CacheKey`]s.

use serde_json::Value;

use crate::models::{
    SearchParams, SearchRequest, DEFAULT_TOP_K, DEFAULT_W_KEYWORD, DEFAULT_W_SEMANTIC,
};
use crate::search::filter::MetadataFilter;

/// `top_k` used when the supplied value cannot be read as a non-negative integer.
pub const FALLBACK_TOP_K: usize = 5;

/// Which ranked-result path produced a cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchMode {
    Semantic,
    Keyword,
    Hybrid,
    Advanced,
}

/// Result-cache key. Weights are compared after rounding to 6 decimals.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub mode: SearchMode,
    pub query: String,
    pub top_k: usize,
    pub w_semantic: i64,
    pub w_keyword: i64,
    pub filter: MetadataFilter,
}

impl CacheKey {
    pub fn new(mode: SearchMode, params: &SearchParams) -> Self {
        Self {
            mode,
            query: params.query.clone(),
            top_k: params.top_k,
            w_semantic: round6(params.w_semantic),
            w_keyword: round6(params.w_keyword),
            filter: params.filter.clone(),
        }
    }
}

fn round6(w: f32) -> i64 {
    (f64::from(w) * 1e6).round() as i64
}

/// Turn a loosely-typed request into canonical params.
pub fn canonicalize(req: &SearchRequest) -> SearchParams {
    SearchParams {
        query: req.query.clone(),
        top_k: coerce_top_k(req.top_k.as_ref()),
        w_semantic: coerce_weight(req.w_semantic.as_ref(), DEFAULT_W_SEMANTIC),
        w_keyword: coerce_weight(req.w_keyword.as_ref(), DEFAULT_W_KEYWORD),
        filter: req
            .metadata_filter
            .as_ref()
            .map(MetadataFilter::from_json)
            .unwrap_or_default(),
    }
}

/// Absent → [`DEFAULT_TOP_K`]; present but not a non-negative integer → [`FALLBACK_TOP_K`].
pub fn coerce_top_k(raw: Option<&Value>) -> usize {
    let Some(raw) = raw else {
        return DEFAULT_TOP_K;
    };

    let parsed = match raw {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    match parsed.and_then(|v| usize::try_from(v).ok()) {
        Some(v) => v,
        None => {
            tracing::warn!("Invalid top_k {raw}; using {FALLBACK_TOP_K}");
            FALLBACK_TOP_K
        }
    }
}

/// Absent or not a finite number → `default`.
pub fn coerce_weight(raw: Option<&Value>, default: f32) -> f32 {
    let Some(raw) = raw else {
        return default;
    };

    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed.filter(|f| f.is_finite()) {
        Some(v) => v as f32,
        None => {
            tracing::warn!("Invalid weight {raw}; using {default}");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: Value) -> SearchRequest {
        serde_json::from_value(body).unwrap()
    }

    fn key(body: Value) -> CacheKey {
        CacheKey::new(SearchMode::Hybrid, &canonicalize(&request(body)))
    }

    #[test]
    fn test_numeric_text_and_numbers_share_a_key() {
        let a = key(json!({"query": "q", "top_k": 5, "w_semantic": 0.7, "w_keyword": 0.3}));
        let b = key(json!({"query": "q", "top_k": "5", "w_semantic": "0.7", "w_keyword": "0.3"}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_integral_float_top_k_accepted() {
        assert_eq!(coerce_top_k(Some(&json!(4.0))), 4);
    }

    #[test]
    fn test_absent_values_use_request_defaults() {
        let params = canonicalize(&request(json!({"query": "q"})));
        assert_eq!(params.top_k, DEFAULT_TOP_K);
        assert_eq!(params.w_semantic, DEFAULT_W_SEMANTIC);
        assert_eq!(params.w_keyword, DEFAULT_W_KEYWORD);
        assert!(params.filter.is_empty());
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let params = canonicalize(&request(json!({
            "query": "q",
            "top_k": "many",
            "w_semantic": "heavy",
            "w_keyword": [1, 2]
        })));
        assert_eq!(params.top_k, FALLBACK_TOP_K);
        assert_eq!(params.w_semantic, 0.7);
        assert_eq!(params.w_keyword, 0.3);
    }

    #[test]
    fn test_null_and_negative_top_k_fall_back() {
        assert_eq!(coerce_top_k(Some(&Value::Null)), FALLBACK_TOP_K);
        assert_eq!(coerce_top_k(Some(&json!(-2))), FALLBACK_TOP_K);
        assert_eq!(coerce_top_k(Some(&json!(2.5))), FALLBACK_TOP_K);
    }

    #[test]
    fn test_non_finite_weight_falls_back() {
        assert_eq!(coerce_weight(Some(&json!("NaN")), 0.3), 0.3);
        assert_eq!(coerce_weight(Some(&json!("inf")), 0.7), 0.7);
    }

    #[test]
    fn test_weights_rounded_to_six_decimals() {
        let a = key(json!({"query": "q", "w_semantic": 0.5}));
        let b = key(json!({"query": "q", "w_semantic": 0.50000001}));
        let c = key(json!({"query": "q", "w_semantic": 0.5001}));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_filter_order_does_not_matter() {
        let a = key(json!({"query": "q", "metadata_filter": {"doc_type": "pdf", "source": "a"}}));
        let b = key(json!({"query": "q", "metadata_filter": {"source": "a", "doc_type": "pdf"}}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_mode_and_query_distinguish_keys() {
        let params = SearchParams::new("q");
        assert_ne!(
            CacheKey::new(SearchMode::Hybrid, &params),
            CacheKey::new(SearchMode::Advanced, &params)
        );
        assert_ne!(
            CacheKey::new(SearchMode::Hybrid, &params),
            CacheKey::new(SearchMode::Hybrid, &SearchParams::new("Q"))
        );
    }
}
