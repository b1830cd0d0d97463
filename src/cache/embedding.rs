use std::sync::Arc;
use std::time::Duration;

use crate::cache::ttl::{CacheStats, Clock, TtlLruCache};
use crate::error::{Result, SearchError};
use crate::llm::Embedder;

/// Memoizes text → vector for a single embedding model.
pub struct EmbeddingCache {
    embedder: Arc<dyn Embedder>,
    cache: TtlLruCache<String, Arc<Vec<f32>>>,
}

impl EmbeddingCache {
    pub fn new(embedder: Arc<dyn Embedder>, capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            embedder,
            cache: TtlLruCache::with_clock(capacity, ttl, clock),
        }
    }

    /// Embed `text`, calling the provider only on a miss.
    pub async fn embed(&self, text: &str) -> Result<Arc<Vec<f32>>> {
        let embedder = &self.embedder;
        self.cache
            .get_or_compute(text.to_string(), move || async move {
                let vector = embedder
                    .embed(text)
                    .await
                    .map_err(SearchError::provider("embedder"))?;
                Ok::<_, SearchError>(Arc::new(vector))
            })
            .await
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
