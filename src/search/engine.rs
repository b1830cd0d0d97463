use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::embedding::EmbeddingCache;
use crate::cache::key::{CacheKey, SearchMode};
use crate::cache::ttl::{CacheStats, Clock, SystemClock, TtlLruCache};
use crate::config::{CacheConfig, Config, SearchConfig};
use crate::error::Result;
use crate::llm::query_expand::QueryExpander;
use crate::llm::rerank::Reranker;
use crate::llm::{CrossEncoder, Embedder, QueryRewriter};
use crate::models::{PassageRecord, ScoredPassage, SearchParams, Strategy};
use crate::search::bm25::Bm25Index;
use crate::search::hybrid::{align_semantic, fuse, FusionWeights};
use crate::search::passages::PassageStore;
use crate::search::vector::{IngestReport, SemanticIndex, SemanticMatch, VectorBackend};

/// External models and the vector backend, constructed by the caller.
pub struct Providers {
    pub embedder: Arc<dyn Embedder>,
    pub cross_encoder: Arc<dyn CrossEncoder>,
    pub rewriter: Arc<dyn QueryRewriter>,
    pub vector_backend: Arc<dyn VectorBackend>,
}

/// Tuning knobs for the engine.
pub struct EngineSettings {
    pub cache: CacheConfig,
    pub search: SearchConfig,
    pub clock: Arc<dyn Clock>,
    /// Seed for the A/B `auto` draw. `None` seeds from OS entropy.
    pub ab_seed: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            search: SearchConfig::default(),
            clock: Arc::new(SystemClock),
            ab_seed: None,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache: config.cache.clone(),
            search: config.search.clone(),
            ..Self::default()
        }
    }
}

/// Result of an A/B request: which strategy actually ran, and its results.
#[derive(Debug, Clone)]
pub struct AbTestOutcome {
    pub strategy_used: Strategy,
    pub results: Vec<ScoredPassage>,
}

/// Counters for both caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineCacheStats {
    pub embeddings: CacheStats,
    pub results: CacheStats,
}

/// Hybrid retrieval over a fixed passage collection.
///
/// Every ranked-result operation goes through the result cache, keyed by
/// the operation and its canonical parameters.
pub struct SearchEngine {
    store: Arc<PassageStore>,
    bm25: Bm25Index,
    semantic: SemanticIndex,
    embeddings: EmbeddingCache,
    reranker: Reranker,
    expander: QueryExpander,
    results: TtlLruCache<CacheKey, Vec<ScoredPassage>>,
    search: SearchConfig,
    ab_rng: Mutex<StdRng>,
}

impl SearchEngine {
    /// Build the lexical index over `store` and wire up the providers.
    ///
    /// Does not touch the vector backend; call [`SearchEngine::ingest`] for that.
    pub fn new(store: Arc<PassageStore>, providers: Providers, settings: EngineSettings) -> Result<Self> {
        let ttl = Duration::from_secs(settings.cache.ttl_secs);
        let capacity = settings.cache.capacity;

        let bm25 = Bm25Index::build(Arc::clone(&store))?;

        let ab_rng = match settings.ab_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            bm25,
            semantic: SemanticIndex::new(providers.vector_backend),
            embeddings: EmbeddingCache::new(providers.embedder, capacity, ttl, Arc::clone(&settings.clock)),
            reranker: Reranker::new(providers.cross_encoder),
            expander: QueryExpander::new(providers.rewriter),
            results: TtlLruCache::with_clock(capacity, ttl, settings.clock),
            search: settings.search,
            ab_rng: Mutex::new(ab_rng),
            store,
        })
    }

    pub fn store(&self) -> &Arc<PassageStore> {
        &self.store
    }

    /// Load every passage into the vector backend. A no-op if it already holds records.
    pub async fn ingest(&self) -> Result<IngestReport> {
        self.semantic.ingest(&self.store, &self.embeddings).await
    }

    /// Nearest passages by embedding similarity.
    pub async fn semantic_search(&self, params: &SearchParams) -> Result<Vec<ScoredPassage>> {
        self.cached(SearchMode::Semantic, params, move || self.compute_semantic(params))
            .await
    }

    /// Top passages by BM25.
    pub async fn keyword_search(&self, params: &SearchParams) -> Result<Vec<ScoredPassage>> {
        self.cached(SearchMode::Keyword, params, move || async move {
            self.bm25
                .keyword_search(&params.query, params.top_k, &params.filter)
        })
        .await
    }

    /// Weighted fusion of semantic and BM25 scores over every passage.
    pub async fn hybrid_search(&self, params: &SearchParams) -> Result<Vec<ScoredPassage>> {
        self.cached(SearchMode::Hybrid, params, move || {
            self.fused(&params.query, params.top_k, params)
        })
        .await
    }

    /// Rewrite, fuse a fixed-width candidate pool, rerank, truncate.
    ///
    /// Any provider failure aborts the whole pipeline.
    pub async fn advanced_search(&self, params: &SearchParams) -> Result<Vec<ScoredPassage>> {
        self.cached(SearchMode::Advanced, params, move || self.compute_advanced(params))
            .await
    }

    /// Run the requested strategy, resolving `auto` to semantic or hybrid.
    pub async fn ab_test(&self, params: &SearchParams, strategy: Strategy) -> Result<AbTestOutcome> {
        let strategy_used = self.resolve_strategy(strategy);
        tracing::debug!("A/B request for '{}' using {:?}", params.query, strategy_used);

        let results = match strategy_used {
            Strategy::Semantic => self.semantic_search(params).await?,
            Strategy::Keyword => self.keyword_search(params).await?,
            Strategy::Hybrid | Strategy::Auto => self.hybrid_search(params).await?,
        };

        Ok(AbTestOutcome {
            strategy_used,
            results,
        })
    }

    pub fn cache_stats(&self) -> EngineCacheStats {
        EngineCacheStats {
            embeddings: self.embeddings.stats(),
            results: self.results.stats(),
        }
    }

    /// When the cached result for this operation was computed, if still held.
    pub fn cached_at(&self, mode: SearchMode, params: &SearchParams) -> Option<Instant> {
        self.results.created_at(&CacheKey::new(mode, params))
    }

    fn resolve_strategy(&self, strategy: Strategy) -> Strategy {
        match strategy {
            Strategy::Auto => {
                if self.ab_rng.lock().gen_bool(0.5) {
                    Strategy::Semantic
                } else {
                    Strategy::Hybrid
                }
            }
            explicit => explicit,
        }
    }

    async fn cached<F, Fut>(&self, mode: SearchMode, params: &SearchParams, compute: F) -> Result<Vec<ScoredPassage>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<ScoredPassage>>>,
    {
        let key = CacheKey::new(mode, params);
        self.results.get_or_compute(key, compute).await
    }

    async fn compute_semantic(&self, params: &SearchParams) -> Result<Vec<ScoredPassage>> {
        let vector = self.embeddings.embed(&params.query).await?;
        let matches = self
            .semantic
            .query(&vector, params.top_k, &params.filter)
            .await?;

        Ok(matches
            .into_iter()
            .map(|m| {
                let score = m.similarity;
                ScoredPassage {
                    passage: self.resolve_passage(m),
                    score,
                }
            })
            .collect())
    }

    /// Fuse both signals for `query` over every passage, keeping `top_k`.
    async fn fused(&self, query: &str, top_k: usize, params: &SearchParams) -> Result<Vec<ScoredPassage>> {
        let vector = self.embeddings.embed(query).await?;
        let matches = self
            .semantic
            .query(&vector, self.store.len(), &params.filter)
            .await?;
        let semantic = align_semantic(&self.store, &matches);

        let tokens = self.bm25.tokenize(query)?;
        let keyword = self.bm25.score(&tokens)?;

        let weights = FusionWeights {
            w_semantic: params.w_semantic,
            w_keyword: params.w_keyword,
            normalization: self.search.normalization,
        };
        Ok(fuse(&self.store, &semantic, &keyword, weights, &params.filter, top_k))
    }

    async fn compute_advanced(&self, params: &SearchParams) -> Result<Vec<ScoredPassage>> {
        tracing::debug!("Advanced search received: '{}'", params.query);

        let expanded = self.expander.expand(&params.query).await?;
        tracing::debug!("Query expanded: '{}' -> '{}'", params.query, expanded);

        let candidates = self
            .fused(&expanded, self.search.candidate_width, params)
            .await?;
        tracing::debug!("Fused {} candidates for reranking", candidates.len());

        let mut reranked = self.reranker.rerank(&expanded, candidates).await?;
        tracing::debug!("Reranked {} candidates", reranked.len());

        reranked.truncate(params.top_k);
        Ok(reranked)
    }

    /// Prefer the store's record; fall back to what the backend returned for
    /// ids the store does not know.
    fn resolve_passage(&self, m: SemanticMatch) -> Arc<PassageRecord> {
        match self.store.position_of(&m.id).and_then(|p| self.store.get(p)) {
            Some(passage) => Arc::clone(passage),
            None => Arc::new(PassageRecord {
                id: m.id,
                content: m.content,
                metadata: m.metadata,
            }),
        }
    }
}
