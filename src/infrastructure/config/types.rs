//! Configuration types
//!
//! One validated struct tree covering every recognized option. Loaded once
//! at startup and immutable afterwards; the long-lived service handles all
//! borrow from the same `Arc<RagConfig>`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

use crate::domain::error::{Error, Result};
use crate::domain::types::FusionKind;

/// Storage backend selection; only Qdrant is supported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Remote Qdrant instance over its REST API
    #[default]
    Qdrant,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Qdrant => write!(f, "qdrant"),
        }
    }
}

/// Vector storage settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StorageConfig {
    /// Which backend to use
    #[serde(default)]
    pub backend: StorageBackend,
    /// Qdrant endpoint
    #[validate(length(min = 1, max = 2048))]
    pub qdrant_url: String,
    /// Qdrant API key, when the endpoint requires one
    pub qdrant_api_key: Option<String>,
    /// Collection holding every record
    #[validate(length(min = 1, max = 128))]
    pub collection_name: String,
    /// Enable int8 scalar quantization on the collection
    #[serde(default)]
    pub quantization: bool,
    /// Per-operation timeout in seconds
    #[validate(range(min = 1, max = 300))]
    pub operation_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Qdrant,
            qdrant_url: "http://localhost:6333".to_string(),
            qdrant_api_key: None,
            collection_name: "claude_memory".to_string(),
            quantization: false,
            operation_timeout_secs: 30,
        }
    }
}

/// Connection pool tuning
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PoolConfig {
    /// Maximum live connections
    #[validate(range(min = 1, max = 64))]
    pub size: usize,
    /// Connections kept warm
    #[validate(range(min = 1, max = 64))]
    pub min_size: usize,
    /// How long `acquire` waits for a free slot, in seconds
    #[validate(range(min = 1, max = 120))]
    pub timeout_secs: u64,
    /// Connections older than this are closed on release, in seconds
    #[validate(range(min = 60))]
    pub recycle_secs: u64,
    /// Background deep health check cadence, in seconds
    #[validate(range(min = 5))]
    pub health_check_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 10,
            min_size: 2,
            timeout_secs: 10,
            recycle_secs: 3600,
            health_check_interval_secs: 60,
        }
    }
}

/// Embedding model and batching settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EmbeddingSettings {
    /// Model identifier (fastembed model name)
    #[validate(length(min = 1))]
    pub model: String,
    /// Expected output dimension; inserts are validated against this
    #[validate(range(min = 1, max = 4096))]
    pub dimension: usize,
    /// Texts per model batch
    #[validate(range(min = 1, max = 512))]
    pub batch_size: usize,
    /// Bounded worker count for parallel batches; 0 means
    /// `min(available_parallelism, 8)`
    #[validate(range(max = 64))]
    pub parallel_workers: usize,
    /// Whether batches run concurrently at all
    pub enable_parallel: bool,
    /// Cache database location
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    /// Cache row TTL in days
    #[validate(range(min = 1, max = 365))]
    pub cache_ttl_days: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            dimension: 384,
            batch_size: 32,
            parallel_workers: 0,
            enable_parallel: true,
            cache_path: default_data_path("embedding_cache.db"),
            cache_ttl_days: 30,
        }
    }
}

impl EmbeddingSettings {
    /// Resolve the effective worker count
    pub fn effective_workers(&self) -> usize {
        if !self.enable_parallel {
            return 1;
        }
        if self.parallel_workers > 0 {
            return self.parallel_workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get().min(8))
            .unwrap_or(4)
    }
}

/// File watcher settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WatcherConfig {
    /// Whether the watcher runs at all
    pub enabled: bool,
    /// Quiet window before a changed path is flushed, in milliseconds
    #[validate(range(min = 50, max = 60_000))]
    pub debounce_ms: u64,
    /// Maximum distinct paths buffered between flushes
    #[validate(range(min = 16))]
    pub buffer_limit: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            debounce_ms: 1000,
            buffer_limit: 4096,
        }
    }
}

/// Hybrid retrieval settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HybridConfig {
    /// Whether hybrid mode is available
    pub enabled: bool,
    /// Weight of the semantic branch in linear fusion
    #[validate(range(min = 0.0, max = 1.0))]
    pub alpha: f32,
    /// Fusion strategy
    #[serde(default)]
    pub fusion: FusionKind,
    /// `k` constant for reciprocal-rank fusion
    #[validate(range(min = 1, max = 1000))]
    pub rrf_k: u32,
    /// Stratified cap: max results per context level in the final top-k
    #[validate(range(min = 1, max = 100))]
    pub cap_per_level: usize,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            alpha: 0.5,
            fusion: FusionKind::Linear,
            rrf_k: 60,
            cap_per_level: 3,
        }
    }
}

/// Search scoping settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct SearchConfig {
    /// Project resolved when `search_code` is called without one
    pub current_project: Option<String>,
    /// Projects that may be searched from outside their own scope
    #[serde(default)]
    pub cross_project_opt_in: Vec<String>,
}

/// Security settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SecurityConfig {
    /// Reject every mutating operation before any I/O
    pub read_only_mode: bool,
    /// Maximum record content size in bytes
    #[validate(range(min = 1, max = 1_048_576))]
    pub content_max_bytes: usize,
    /// Append-only security event log location
    #[serde(default = "default_security_log_path")]
    pub security_log_path: PathBuf,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            read_only_mode: false,
            content_max_bytes: 51_200,
            security_log_path: default_data_path("security.log"),
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct RagConfig {
    /// Vector storage settings
    #[serde(default)]
    #[validate(nested)]
    pub storage: StorageConfig,
    /// Connection pool settings
    #[serde(default)]
    #[validate(nested)]
    pub pool: PoolConfig,
    /// Embedding settings
    #[serde(default)]
    #[validate(nested)]
    pub embedding: EmbeddingSettings,
    /// Watcher settings
    #[serde(default)]
    #[validate(nested)]
    pub watcher: WatcherConfig,
    /// Hybrid retrieval settings
    #[serde(default)]
    #[validate(nested)]
    pub hybrid: HybridConfig,
    /// Search scoping settings
    #[serde(default)]
    #[validate(nested)]
    pub search: SearchConfig,
    /// Security settings
    #[serde(default)]
    #[validate(nested)]
    pub security: SecurityConfig,
    /// Tracing filter directive, e.g. `info` or `claude_rag=debug`
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cache_path() -> PathBuf {
    default_data_path("embedding_cache.db")
}

fn default_security_log_path() -> PathBuf {
    default_data_path("security.log")
}

/// Resolve `~/.claude-rag/<file>`; falls back to a relative path when the
/// home directory cannot be determined (containers, tests)
pub fn default_data_path(file: &str) -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".claude-rag").join(file))
        .unwrap_or_else(|| PathBuf::from(".claude-rag").join(file))
}

impl RagConfig {
    /// Cross-field checks `validator` cannot express
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::config(format!("configuration validation failed: {e}")))?;
        if self.pool.min_size > self.pool.size {
            return Err(Error::config(format!(
                "pool.min_size ({}) exceeds pool.size ({})",
                self.pool.min_size, self.pool.size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        RagConfig::default().check().expect("defaults validate");
    }

    #[test]
    fn pool_size_cross_check() {
        let mut cfg = RagConfig::default();
        cfg.pool.min_size = 20;
        cfg.pool.size = 4;
        assert!(cfg.check().is_err());
    }

    #[test]
    fn effective_workers_bounds() {
        let mut settings = EmbeddingSettings::default();
        settings.enable_parallel = false;
        assert_eq!(settings.effective_workers(), 1);

        settings.enable_parallel = true;
        settings.parallel_workers = 3;
        assert_eq!(settings.effective_workers(), 3);

        settings.parallel_workers = 0;
        assert!(settings.effective_workers() >= 1);
        assert!(settings.effective_workers() <= 8);
    }
}
