use crate::domain::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Contract for text-to-vector providers.
///
/// Implementations return raw model output; L2 normalization and caching
/// live in the cached-embedder wrapper so every provider behaves the same
/// at the seam.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, preserving input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Output vector dimensionality
    fn dimensions(&self) -> usize;

    /// Stable model identifier, part of the cache key
    fn model_id(&self) -> &str;

    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        out.pop()
            .ok_or_else(|| crate::domain::error::Error::embedding("provider returned no vector", vec![0]))
    }
}

/// Shared embedding provider handle
pub type SharedEmbeddingProvider = Arc<dyn EmbeddingProvider>;
