//! Caching: a generic TTL + LRU memo table, request canonicalization for
//! result-cache keys, and the embedding cache.

pub mod embedding;
pub mod key;
pub mod ttl;
