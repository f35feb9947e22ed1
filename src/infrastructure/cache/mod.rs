//! Persistent embedding cache

mod embedding_cache;

pub use embedding_cache::{CacheStats, EmbeddingCache, SharedEmbeddingCache};
