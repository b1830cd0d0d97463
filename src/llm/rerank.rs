use std::sync::Arc;

use crate::error::{Result, SearchError};
use crate::llm::CrossEncoder;
use crate::models::ScoredPassage;

/// Reorders candidates by a pairwise cross-encoder score.
///
/// The incoming (fused) score is discarded: each returned passage carries
/// the cross-encoder score instead.
pub struct Reranker {
    encoder: Arc<dyn CrossEncoder>,
}

impl Reranker {
    pub fn new(encoder: Arc<dyn CrossEncoder>) -> Self {
        Self { encoder }
    }

    pub async fn rerank(&self, query: &str, candidates: Vec<ScoredPassage>) -> Result<Vec<ScoredPassage>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let texts: Vec<String> = candidates.iter().map(|c| c.passage.content.clone()).collect();
        let scores = self
            .encoder
            .score(query, &texts)
            .await
            .map_err(SearchError::provider("cross_encoder"))?;

        if scores.len() != candidates.len() {
            return Err(SearchError::provider("cross_encoder")(anyhow::anyhow!(
                "expected {} scores, got {}",
                candidates.len(),
                scores.len()
            )));
        }

        let mut reranked: Vec<ScoredPassage> = candidates
            .into_iter()
            .zip(scores)
            .map(|(candidate, score)| ScoredPassage {
                passage: candidate.passage,
                score,
            })
            .collect();

        // Stable: equal cross-encoder scores keep the fused order.
        reranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(reranked)
    }
}
