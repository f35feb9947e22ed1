//! Cache-integrated batch encoder
//!
//! Sits between callers and the raw [`EmbeddingProvider`]: every input is
//! looked up in the persistent cache first, only misses reach the model,
//! and results come back in input order regardless of how hits and misses
//! interleave. Misses are split into batches of at most `batch_size` and
//! dispatched across a semaphore-bounded set of workers.
//!
//! Every vector leaving this type is L2-normalized; cached rows were
//! normalized before they were written, so a cache hit is bit-identical to
//! the original encode of the same text.

use futures::future::try_join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::domain::error::{Error, Result};
use crate::domain::ports::SharedEmbeddingProvider;
use crate::infrastructure::cache::SharedEmbeddingCache;

/// Scale a vector to unit L2 norm.
///
/// The naive reference implementation; fast paths must stay
/// observable-equivalent to this within floating-point tolerance.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Result of a batch encode
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeReport {
    /// One vector per input, in input order
    pub vectors: Vec<Vec<f32>>,
    /// Inputs answered from the cache
    pub cache_hits: usize,
    /// Inputs that reached the model
    pub cache_misses: usize,
}

/// Cache-consulting, order-preserving batch encoder
pub struct CachedEmbedder {
    provider: SharedEmbeddingProvider,
    cache: SharedEmbeddingCache,
    batch_size: usize,
    workers: Arc<Semaphore>,
}

impl CachedEmbedder {
    /// Wrap a provider with the cache and a bounded worker pool
    pub fn new(
        provider: SharedEmbeddingProvider,
        cache: SharedEmbeddingCache,
        batch_size: usize,
        workers: usize,
    ) -> Self {
        Self {
            provider,
            cache,
            batch_size: batch_size.max(1),
            workers: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Model identifier of the wrapped provider
    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    /// Output dimensionality of the wrapped provider
    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Encode one text
    pub async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let report = self.encode_batch(std::slice::from_ref(&text.to_string())).await?;
        report
            .vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::embedding("encoder returned no vector", vec![0]))
    }

    /// Encode a batch, preserving input order.
    ///
    /// Any model failure fails the whole call (the affected batch indices
    /// ride along in the error); partially encoded inputs are discarded so
    /// the caller can retry the file as a unit.
    pub async fn encode_batch(&self, texts: &[String]) -> Result<EncodeReport> {
        let model = self.provider.model_id().to_string();
        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses: Vec<usize> = Vec::new();

        for (idx, text) in texts.iter().enumerate() {
            match self.cache.get(text, &model) {
                Ok(Some(vector)) => vectors[idx] = Some(vector),
                Ok(None) => misses.push(idx),
                Err(err) => {
                    // A broken cache row degrades to a miss.
                    tracing::warn!(error = %err, "embedding cache read failed");
                    misses.push(idx);
                }
            }
        }
        let cache_hits = texts.len() - misses.len();
        let cache_misses = misses.len();

        let chunk_results = try_join_all(misses.chunks(self.batch_size).map(|chunk| {
            let indices: Vec<usize> = chunk.to_vec();
            let batch: Vec<String> = indices.iter().map(|&i| texts[i].clone()).collect();
            let provider = self.provider.clone();
            let workers = self.workers.clone();
            async move {
                let _permit = workers
                    .acquire()
                    .await
                    .map_err(|_| Error::internal("embedding worker pool closed"))?;
                let vectors = provider.embed_batch(&batch).await.map_err(|err| match err {
                    Error::Embedding { detail, .. } => Error::embedding(detail, indices.clone()),
                    other => other,
                })?;
                Ok::<_, Error>((indices, vectors))
            }
        }))
        .await?;

        for (indices, batch_vectors) in chunk_results {
            if batch_vectors.len() != indices.len() {
                return Err(Error::embedding(
                    format!(
                        "model returned {} vectors for {} inputs",
                        batch_vectors.len(),
                        indices.len()
                    ),
                    indices,
                ));
            }
            for (&idx, mut vector) in indices.iter().zip(batch_vectors) {
                l2_normalize(&mut vector);
                if let Err(err) = self.cache.put(&texts[idx], &model, &vector) {
                    tracing::warn!(error = %err, "embedding cache write failed");
                }
                vectors[idx] = Some(vector);
            }
        }

        let vectors = vectors
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::embedding("encoder left gaps in the batch", vec![]))?;

        Ok(EncodeReport {
            vectors,
            cache_hits,
            cache_misses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::providers::embedding::NullEmbeddingProvider;
    use crate::domain::ports::EmbeddingProvider;
    use crate::infrastructure::cache::EmbeddingCache;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts model calls so tests can assert cache behavior.
    struct CountingProvider {
        inner: NullEmbeddingProvider,
        calls: AtomicUsize,
        texts_embedded: AtomicUsize,
    }

    impl CountingProvider {
        fn new(dim: usize) -> Self {
            Self {
                inner: NullEmbeddingProvider::new(dim),
                calls: AtomicUsize::new(0),
                texts_embedded: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
            self.inner.embed_batch(texts).await
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        fn model_id(&self) -> &str {
            "counting"
        }
    }

    fn embedder(provider: Arc<CountingProvider>, batch_size: usize) -> CachedEmbedder {
        let cache = Arc::new(EmbeddingCache::ephemeral().unwrap());
        CachedEmbedder::new(provider, cache, batch_size, 4)
    }

    #[tokio::test]
    async fn vectors_are_normalized() {
        let provider = Arc::new(CountingProvider::new(64));
        let embedder = embedder(provider, 8);
        let vector = embedder.encode("some text").await.unwrap();
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3, "norm = {norm}");
    }

    #[tokio::test]
    async fn cache_hit_is_bit_identical_and_skips_the_model() {
        let provider = Arc::new(CountingProvider::new(32));
        let embedder = embedder(provider.clone(), 8);

        let first = embedder.encode("stable text").await.unwrap();
        let calls_after_first = provider.calls.load(Ordering::SeqCst);

        let second = embedder.encode("stable text").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[tokio::test]
    async fn batch_preserves_order_across_hits_and_misses() {
        let provider = Arc::new(CountingProvider::new(32));
        let embedder = embedder(provider.clone(), 2);

        // Warm the cache for half the inputs.
        let warm = vec!["b".to_string(), "d".to_string()];
        embedder.encode_batch(&warm).await.unwrap();

        let texts: Vec<String> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let report = embedder.encode_batch(&texts).await.unwrap();
        assert_eq!(report.vectors.len(), 5);
        assert_eq!(report.cache_hits, 2);
        assert_eq!(report.cache_misses, 3);

        // Each position matches a fresh single encode of the same text.
        for (text, vector) in texts.iter().zip(&report.vectors) {
            assert_eq!(&embedder.encode(text).await.unwrap(), vector);
        }
    }

    #[tokio::test]
    async fn misses_split_into_batches() {
        let provider = Arc::new(CountingProvider::new(16));
        let embedder = embedder(provider.clone(), 2);
        let texts: Vec<String> = (0..5).map(|i| format!("text {i}")).collect();
        embedder.encode_batch(&texts).await.unwrap();
        // 5 misses at batch size 2 → 3 model calls.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(provider.texts_embedded.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let provider = Arc::new(CountingProvider::new(16));
        let embedder = embedder(provider.clone(), 2);
        let report = embedder.encode_batch(&[]).await.unwrap();
        assert!(report.vectors.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
