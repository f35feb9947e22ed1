//! Layered, validated configuration

mod loader;
mod types;

pub use loader::{default_config_toml, ConfigLoader};
pub use types::{
    default_data_path, EmbeddingSettings, HybridConfig, PoolConfig, RagConfig, SearchConfig,
    SecurityConfig, StorageBackend, StorageConfig, WatcherConfig,
};
