//! # passage-search
//!
//! Hybrid passage retrieval over a fixed collection: BM25 full-text scoring,
//! vector semantic similarity, weighted score fusion, cross-encoder
//! re-ranking and LLM query rewriting, with TTL + LRU caching in front of
//! every ranked-result path.
//!
//! ## Architecture
//!
//! The advanced search pipeline:
//!
//! ```text
//!                          ┌─────────────┐
//!                          │  User Query  │
//!                          └──────┬───────┘
//!                                 │
//!                                 ▼
//!                      ┌─────────────────────┐
//!                      │  Query Rewrite (LLM) │
//!                      └──────────┬──────────┘
//!                                 │ expanded query
//!                    ┌────────────┴────────────┐
//!                    ▼                         ▼
//!           ┌────────────────┐       ┌─────────────────┐
//!           │  BM25 (tantivy) │       │ Embedding Cache │
//!           │  every passage  │       │ → Vector Store  │
//!           └───────┬────────┘       └────────┬────────┘
//!                   │ kw[i]                   │ sem[i]
//!                   └────────────┬────────────┘
//!                                ▼
//!                  ┌───────────────────────────┐
//!                  │  Weighted Fusion + Filter  │
//!                  │  w_sem·sem + w_kw·kw      │
//!                  │  Keep candidate width     │
//!                  └─────────────┬─────────────┘
//!                                │
//!                                ▼
//!                  ┌───────────────────────────┐
//!                  │  Cross-Encoder Re-ranking  │
//!                  │  replaces fused score      │
//!                  └─────────────┬─────────────┘
//!                                │
//!                                ▼
//!                  ┌───────────────────────────┐
//!                  │   Truncate to top_k        │
//!                  └───────────────────────────┘
//! ```
//!
//! Semantic, keyword and hybrid search are the same graph with stages
//! removed. All four sit behind the query result cache.
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for paths, caches, retrieval tuning and providers
//! - [`error`] - `SearchError` taxonomy
//! - [`models`] - Passage records, scored results, request/response types
//! - [`cache::ttl`] - Generic TTL + LRU memo table with an injectable clock
//! - [`cache::key`] - Request canonicalization and result-cache keys
//! - [`cache::embedding`] - Text → vector memoization
//! - [`search::passages`] - Immutable passage store loaded from the chunker's JSON output
//! - [`search::bm25`] - BM25 full-text index powered by tantivy
//! - [`search::vector`] - Vector backend trait, in-memory store, and distance → similarity adapter
//! - [`search::hybrid`] - Weighted score fusion with optional min-max normalization
//! - [`search::engine`] - The retrieval engine: every search mode, A/B routing, caching
//! - [`llm::embeddings`] - Embedding generation via Ollama or OpenAI-compatible APIs
//! - [`llm::cross_encoder`] - Cross-encoder scoring via a `/v1/rerank` endpoint
//! - [`llm::rerank`] - Candidate reordering by cross-encoder score
//! - [`llm::query_expand`] - LLM query rewriting
//! - [`api`] - Axum HTTP handlers
//! - [`state`] - Shared application state

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod search;
pub mod state;
