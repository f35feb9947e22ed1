//! Configuration loading
//!
//! Layered sources with fixed precedence: embedded TOML defaults, then the
//! user's JSON config file at `~/.claude-rag/config.json`, then
//! `CLAUDE_RAG__`-prefixed environment variables on top
//! (`CLAUDE_RAG__STORAGE__QDRANT_URL`, `CLAUDE_RAG__SECURITY__READ_ONLY_MODE`, ...).

use config::{Config as ConfigBuilder, Environment, FileFormat};
use std::path::Path;

use crate::domain::error::{Error, Result};

use super::types::{default_data_path, RagConfig};

/// Embedded default configuration; the single source of truth for defaults.
const DEFAULT_CONFIG_TOML: &str = include_str!("../../../config/default.toml");

/// The embedded default config TOML, exposed so tests can verify it parses
pub fn default_config_toml() -> &'static str {
    DEFAULT_CONFIG_TOML
}

/// Configuration loader
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Create a loader
    pub fn new() -> Self {
        Self
    }

    /// Load from defaults, the standard user config file, and environment
    pub fn load(&self) -> Result<RagConfig> {
        let user_config = default_data_path("config.json");
        self.load_layered(Some(user_config.as_path()))
    }

    /// Load from defaults, an explicit config file, and environment
    pub fn load_with_file(&self, path: &Path) -> Result<RagConfig> {
        self.load_layered(Some(path))
    }

    /// Load from defaults and environment only
    pub fn load_defaults(&self) -> Result<RagConfig> {
        self.load_layered(None)
    }

    fn load_layered(&self, user_file: Option<&Path>) -> Result<RagConfig> {
        let mut builder = ConfigBuilder::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG_TOML, FileFormat::Toml));

        if let Some(path) = user_file {
            if path.exists() {
                builder = builder.add_source(
                    config::File::from(path.to_path_buf())
                        .format(FileFormat::Json)
                        .required(false),
                );
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("CLAUDE_RAG")
                .separator("__")
                .try_parsing(true),
        );

        let raw = builder
            .build()
            .map_err(|e| Error::config(format!("failed to assemble configuration: {e}")))?;

        let cfg: RagConfig = raw
            .try_deserialize()
            .map_err(|e| Error::config(format!("failed to deserialize configuration: {e}")))?;

        cfg.check()?;
        Ok(cfg)
    }
}
