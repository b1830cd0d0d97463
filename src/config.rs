use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::search::hybrid::FusionNormalization;
use crate::search::vector::DistanceMetric;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Passage source produced by the external chunker (JSON array)
    pub chunks_file: PathBuf,
    /// Where the vector store persists its entries
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// Bounds shared by the embedding cache and the query result cache
    pub cache: CacheConfig,
    /// Retrieval tuning
    pub search: SearchConfig,
    /// LLM provider configuration (embeddings + query rewriting)
    pub llm: LlmConfig,
    /// Cross-encoder reranker configuration
    pub reranker: RerankerConfig,
}

/// Capacity and TTL applied to each cache independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds an entry stays valid after it is stored
    pub ttl_secs: u64,
    /// Maximum entries before least-recently-used eviction
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            capacity: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Fused candidates handed to the reranker in advanced search,
    /// independent of the caller's `top_k`.
    pub candidate_width: usize,
    /// Metric the vector backend reports distances in.
    pub distance_metric: DistanceMetric,
    /// Rescaling applied to each signal before weighted fusion.
    pub normalization: FusionNormalization,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            candidate_width: 3,
            distance_metric: DistanceMetric::Cosine,
            normalization: FusionNormalization::None,
        }
    }
}

/// Configuration for the cross-encoder reranker sidecar (e.g. llama-server with a reranker model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Base URL for the reranker API (e.g. "http://127.0.0.1:8082").
    pub base_url: Option<String>,
    /// Model name to send in the rerank request.
    pub model: Option<String>,
    /// Request timeout in seconds (capped at 30).
    pub timeout_secs: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for query rewriting
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunks_file: PathBuf::from("./output/chunks.json"),
            data_dir: PathBuf::from("./output"),
            bind_addr: "127.0.0.1:8000".to_string(),
            cache: CacheConfig::default(),
            search: SearchConfig::default(),
            llm: LlmConfig::default(),
            reranker: RerankerConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            embedding_model: "all-minilm".to_string(),
            api_key: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("PASSAGE_SEARCH_CHUNKS_FILE") {
            config.chunks_file = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("PASSAGE_SEARCH_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("PASSAGE_SEARCH_BIND_ADDR") {
            config.bind_addr = addr;
        }

        // Cache bounds
        if let Ok(val) = std::env::var("PASSAGE_SEARCH_CACHE_TTL_SECS") {
            if let Ok(v) = val.parse() {
                config.cache.ttl_secs = v;
            }
        }
        if let Ok(val) = std::env::var("PASSAGE_SEARCH_CACHE_SIZE") {
            if let Ok(v) = val.parse() {
                config.cache.capacity = v;
            }
        }

        // Retrieval tuning
        if let Ok(val) = std::env::var("PASSAGE_SEARCH_CANDIDATE_WIDTH") {
            if let Ok(v) = val.parse() {
                config.search.candidate_width = v;
            }
        }
        if let Ok(val) = std::env::var("PASSAGE_SEARCH_DISTANCE_METRIC") {
            if let Ok(v) = val.parse() {
                config.search.distance_metric = v;
            }
        }
        if let Ok(val) = std::env::var("PASSAGE_SEARCH_FUSION_NORMALIZATION") {
            if let Ok(v) = val.parse() {
                config.search.normalization = v;
            }
        }

        // LLM config
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }

        // Reranker config
        if let Ok(url) = std::env::var("RERANKER_BASE_URL") {
            config.reranker.base_url = Some(url);
        }
        if let Ok(model) = std::env::var("RERANKER_MODEL") {
            config.reranker.model = Some(model);
        }
        if let Ok(val) = std::env::var("RERANKER_TIMEOUT_SECS") {
            if let Ok(v) = val.parse::<u64>() {
                config.reranker.timeout_secs = v.min(30); // Cap at 30s
            }
        }

        config
    }

    pub fn vector_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }
}
