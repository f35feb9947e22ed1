//! Local embedding provider backed by fastembed
//!
//! Runs an ONNX sentence-transformer entirely in-process; no API keys, no
//! network after the first model download. Inference is blocking CPU work,
//! so every call moves onto the blocking thread pool and the model sits
//! behind a mutex (`fastembed` requires `&mut self` to embed).

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Arc, Mutex};

use crate::domain::error::{Error, Result};
use crate::domain::ports::EmbeddingProvider;
use crate::infrastructure::config::EmbeddingSettings;

/// fastembed-backed [`EmbeddingProvider`]
pub struct FastEmbedProvider {
    model: Arc<Mutex<TextEmbedding>>,
    model_id: String,
    dimension: usize,
}

impl FastEmbedProvider {
    /// Load the configured model; downloads it on first use
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let kind = Self::model_kind(&settings.model)?;
        let model = TextEmbedding::try_new(
            InitOptions::new(kind).with_show_download_progress(false),
        )
        .map_err(|e| Error::embedding(format!("failed to load {}: {e}", settings.model), vec![]))?;
        tracing::info!(model = %settings.model, dimension = settings.dimension, "embedding model loaded");
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_id: settings.model.clone(),
            dimension: settings.dimension,
        })
    }

    /// Map a configured model name onto a bundled fastembed model.
    ///
    /// The swappable set is the 384-dimensional sentence encoders; anything
    /// else is a configuration error rather than a silent dimension
    /// mismatch at insert time.
    fn model_kind(name: &str) -> Result<EmbeddingModel> {
        match name {
            "sentence-transformers/all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
            "sentence-transformers/all-MiniLM-L6-v2-q" => Ok(EmbeddingModel::AllMiniLML6V2Q),
            "BAAI/bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
            other => Err(Error::config(format!(
                "unsupported embedding model `{other}`"
            ))),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.model.clone();
        let owned: Vec<String> = texts.to_vec();
        let count = owned.len();

        let vectors = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            model.embed(owned, None)
        })
        .await
        .map_err(|e| Error::embedding(format!("embedding task panicked: {e}"), (0..count).collect()))?
        .map_err(|e| Error::embedding(e.to_string(), (0..count).collect()))?;

        if vectors.len() != count {
            return Err(Error::embedding(
                format!("model returned {} vectors for {count} inputs", vectors.len()),
                (0..count).collect(),
            ));
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
