use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::models::{PassageRecord, ScoredPassage};
use crate::search::filter::MetadataFilter;
use crate::search::passages::PassageStore;
use crate::search::vector::SemanticMatch;

/// Rescaling applied to each signal before the weighted sum.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FusionNormalization {
    /// Raw BM25 and raw similarity are summed as-is.
    #[default]
    None,
    /// Each signal is rescaled to `[0, 1]` over the retained passages.
    MinMax,
}

impl FromStr for FusionNormalization {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "" => Ok(FusionNormalization::None),
            "min_max" | "minmax" => Ok(FusionNormalization::MinMax),
            other => anyhow::bail!("Unknown fusion normalization: {other}"),
        }
    }
}

/// Spread semantic matches over store positions. Passages the backend did
/// not return (or ids the store does not know) score zero.
pub fn align_semantic(store: &PassageStore, matches: &[SemanticMatch]) -> Vec<f32> {
    let mut scores = vec![0.0f32; store.len()];
    for m in matches {
        match store.position_of(&m.id) {
            Some(p) => scores[p] = m.similarity,
            None => tracing::warn!("Vector backend returned unknown passage id {}", m.id),
        }
    }
    scores
}

/// Weights and bounds for one fusion pass.
#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub w_semantic: f32,
    pub w_keyword: f32,
    pub normalization: FusionNormalization,
}

/// Weighted score fusion over every passage of the store.
///
/// `semantic[i]` and `keyword[i]` belong to `store.get(i)`; an index past the
/// end of either slice counts as zero. Passages failing `filter` are dropped
/// before ranking. The sort is stable, so ties keep store order.
pub fn fuse(
    store: &PassageStore,
    semantic: &[f32],
    keyword: &[f32],
    weights: FusionWeights,
    filter: &MetadataFilter,
    top_k: usize,
) -> Vec<ScoredPassage> {
    let retained: Vec<(usize, &Arc<PassageRecord>)> = store
        .iter()
        .enumerate()
        .filter(|(_, passage)| filter.matches(&passage.metadata))
        .collect();

    let sem: Vec<f32> = retained
        .iter()
        .map(|(i, _)| semantic.get(*i).copied().unwrap_or(0.0))
        .collect();
    let kw: Vec<f32> = retained
        .iter()
        .map(|(i, _)| keyword.get(*i).copied().unwrap_or(0.0))
        .collect();

    let (sem, kw) = match weights.normalization {
        FusionNormalization::None => (sem, kw),
        FusionNormalization::MinMax => (min_max(sem), min_max(kw)),
    };

    let mut fused: Vec<ScoredPassage> = retained
        .into_iter()
        .zip(sem.into_iter().zip(kw))
        .map(|((_, passage), (s, k))| ScoredPassage {
            passage: Arc::clone(passage),
            score: weights.w_semantic * s + weights.w_keyword * k,
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.truncate(top_k);
    fused
}

/// Rescale to `[0, 1]`. A constant signal carries no ranking information and maps to 0.
fn min_max(values: Vec<f32>) -> Vec<f32> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.into_iter().map(|v| (v - min) / range).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PassageMetadata;

    fn store(types: &[&str]) -> PassageStore {
        let records = types
            .iter()
            .enumerate()
            .map(|(i, t)| PassageRecord {
                id: i.to_string(),
                content: format!("passage {i}"),
                metadata: PassageMetadata {
                    source: "t".to_string(),
                    chunk_index: i,
                    doc_type: t.to_string(),
                    ..Default::default()
                },
            })
            .collect();
        PassageStore::from_records(records).unwrap()
    }

    fn raw(w_semantic: f32, w_keyword: f32) -> FusionWeights {
        FusionWeights {
            w_semantic,
            w_keyword,
            normalization: FusionNormalization::None,
        }
    }

    fn positions(hits: &[ScoredPassage]) -> Vec<usize> {
        hits.iter().map(|h| h.passage.metadata.chunk_index).collect()
    }

    fn sem_match(id: &str, similarity: f32) -> SemanticMatch {
        SemanticMatch {
            id: id.to_string(),
            similarity,
            metadata: PassageMetadata::default(),
            content: String::new(),
        }
    }

    #[test]
    fn test_weighted_sum_is_exact() {
        let store = store(&["a", "a", "a"]);
        let sem = [0.9, 0.1, 0.5];
        let kw = [0.0, 2.0, 1.0];
        let hits = fuse(&store, &sem, &kw, raw(0.7, 0.3), &MetadataFilter::new(), 10);

        for hit in &hits {
            let i = hit.passage.metadata.chunk_index;
            assert_eq!(hit.score, 0.7 * sem[i] + 0.3 * kw[i]);
        }
        assert_eq!(positions(&hits), vec![1, 2, 0]);
    }

    #[test]
    fn test_keyword_weight_zero_ranks_by_semantic() {
        let store = store(&["a", "a", "a"]);
        let hits = fuse(
            &store,
            &[0.2, 0.9, 0.5],
            &[100.0, 0.0, 50.0],
            raw(1.0, 0.0),
            &MetadataFilter::new(),
            3,
        );
        assert_eq!(positions(&hits), vec![1, 2, 0]);
    }

    #[test]
    fn test_missing_scores_count_as_zero() {
        let store = store(&["a", "a", "a"]);
        let hits = fuse(&store, &[0.5], &[], raw(1.0, 1.0), &MetadataFilter::new(), 3);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].score, 0.5);
        assert_eq!(hits[1].score, 0.0);
        assert_eq!(hits[2].score, 0.0);
    }

    #[test]
    fn test_ties_keep_store_order() {
        let store = store(&["a", "a", "a", "a"]);
        let hits = fuse(&store, &[0.5; 4], &[1.0; 4], raw(0.7, 0.3), &MetadataFilter::new(), 4);
        assert_eq!(positions(&hits), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_filter_applied_before_truncation() {
        let store = store(&["pdf", "txt", "pdf", "txt"]);
        let filter = MetadataFilter::new().with("doc_type", "txt");
        let hits = fuse(&store, &[0.9, 0.1, 0.8, 0.2], &[0.0; 4], raw(1.0, 0.0), &filter, 1);
        assert_eq!(positions(&hits), vec![3]);
    }

    #[test]
    fn test_top_k_larger_than_retained_is_not_padded() {
        let store = store(&["pdf", "txt", "pdf"]);
        let filter = MetadataFilter::new().with("doc_type", "pdf");
        let hits = fuse(&store, &[0.1; 3], &[0.1; 3], raw(0.7, 0.3), &filter, 10);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_min_max_rescales_each_signal() {
        let store = store(&["a", "a", "a"]);
        let weights = FusionWeights {
            w_semantic: 0.5,
            w_keyword: 0.5,
            normalization: FusionNormalization::MinMax,
        };
        // Raw BM25 would dominate; normalized, both signals weigh the same.
        let hits = fuse(&store, &[1.0, 0.0, 0.5], &[0.0, 40.0, 10.0], weights, &MetadataFilter::new(), 3);
        assert_eq!(hits[0].score, 0.5);
        assert_eq!(hits[1].score, 0.5);
        assert!((hits[2].score - 0.375).abs() < 1e-6);
        assert_eq!(positions(&hits), vec![0, 1, 2]);
    }

    #[test]
    fn test_min_max_constant_signal_is_zero() {
        assert_eq!(min_max(vec![3.0, 3.0]), vec![0.0, 0.0]);
        assert!(min_max(Vec::new()).is_empty());
    }

    #[test]
    fn test_align_semantic_by_id() {
        let store = store(&["a", "a", "a"]);
        let aligned = align_semantic(&store, &[sem_match("2", 0.9), sem_match("0", 0.4), sem_match("x", 1.0)]);
        assert_eq!(aligned, vec![0.4, 0.0, 0.9]);
    }

    #[test]
    fn test_normalization_from_str() {
        assert_eq!("none".parse::<FusionNormalization>().unwrap(), FusionNormalization::None);
        assert_eq!("min_max".parse::<FusionNormalization>().unwrap(), FusionNormalization::MinMax);
        assert!("zscore".parse::<FusionNormalization>().is_err());
    }
}
