//! Model providers consumed by the engine, and their HTTP implementations.
//!
//! The engine only sees the traits below. Implementations report failures as
//! `anyhow::Error`; the engine wraps them into `SearchError::Provider`.

pub mod cross_encoder;
pub mod embeddings;
pub mod query_expand;
pub mod rerank;

use async_trait::async_trait;

/// Text → fixed-length vector. Must be deterministic for a given model.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Pairwise query–passage relevance. Higher is more relevant.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// One score per passage, in input order.
    async fn score(&self, query: &str, passages: &[String]) -> anyhow::Result<Vec<f32>>;
}

/// Generative query rewrite.
#[async_trait]
pub trait QueryRewriter: Send + Sync {
    async fn rewrite(&self, query: &str) -> anyhow::Result<String>;
}
