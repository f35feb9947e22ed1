//! Trait seams between the domain and the provider adapters

mod embedding;
mod vector_store;

pub use embedding::{EmbeddingProvider, SharedEmbeddingProvider};
pub use vector_store::{ScrollPage, SharedVectorStore, StoreFilter, VectorStore};
