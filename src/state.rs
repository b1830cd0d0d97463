use std::sync::Arc;

use crate::config::Config;
use crate::llm::cross_encoder::HttpCrossEncoder;
use crate::llm::embeddings::HttpEmbedder;
use crate::llm::query_expand::HttpQueryRewriter;
use crate::search::engine::{EngineSettings, Providers, SearchEngine};
use crate::search::passages::PassageStore;
use crate::search::vector::InMemoryVectorStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
}

impl AppState {
    /// Load the passages, build both indexes, and ingest into the vector store.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(config.vector_dir())?;

        let store = Arc::new(PassageStore::load(&config.chunks_file)?);

        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        let vectors =
            InMemoryVectorStore::open_or_create(&config.vector_dir(), config.search.distance_metric)?;

        let providers = Providers {
            embedder: Arc::new(HttpEmbedder::new(http_client.clone(), config.llm.clone())),
            cross_encoder: Arc::new(HttpCrossEncoder::new(
                http_client.clone(),
                config.reranker.clone(),
            )),
            rewriter: Arc::new(HttpQueryRewriter::new(http_client, config.llm.clone())),
            vector_backend: Arc::new(vectors),
        };

        let engine = SearchEngine::new(store, providers, EngineSettings::from_config(&config))?;
        let report = engine.ingest().await?;
        tracing::info!(
            "Vector backend holds {} passages (already present: {})",
            report.count,
            report.already_present
        );

        Ok(Self::from_engine(engine))
    }

    pub fn from_engine(engine: SearchEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}
