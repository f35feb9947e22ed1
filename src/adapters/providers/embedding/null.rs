//! Deterministic stub embedding provider
//!
//! Derives a unit vector from the SHA-256 of the input, so the same text
//! always embeds identically, different texts (almost) never collide, and
//! tests run without loading a model. Not semantically meaningful.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::domain::error::Result;
use crate::domain::ports::EmbeddingProvider;

/// Hash-based [`EmbeddingProvider`] stub
pub struct NullEmbeddingProvider {
    dimension: usize,
}

impl NullEmbeddingProvider {
    /// Create a stub producing vectors of `dimension`
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dimension);
        let mut counter = 0u32;
        while out.len() < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            for chunk in hasher.finalize().chunks_exact(4) {
                if out.len() == self.dimension {
                    break;
                }
                let raw = u32::from_le_bytes(chunk.try_into().unwrap());
                // Map to [-1, 1].
                out.push((raw as f32 / u32::MAX as f32) * 2.0 - 1.0);
            }
            counter += 1;
        }
        out
    }
}

impl Default for NullEmbeddingProvider {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for NullEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_and_distinct() {
        let provider = NullEmbeddingProvider::new(16);
        let a1 = provider.embed("alpha").await.unwrap();
        let a2 = provider.embed("alpha").await.unwrap();
        let b = provider.embed("beta").await.unwrap();
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert_eq!(a1.len(), 16);
    }
}
