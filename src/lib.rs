//! claude-rag — semantic memory and code search core
//!
//! The indexing-and-search engine behind a memory service for AI
//! assistants: heterogeneous inputs (source files, free-form memories,
//! markdown docs, git commits) become vector-searchable records served by
//! semantic, keyword, and hybrid queries.
//!
//! ## Architecture
//!
//! ```text
//! index:  file path → chunking → units → indexer (hash delta)
//!             → cached embedder ⇄ embedding cache → vector store (pooled)
//! search: query → validation → embed → ANN search (pooled)
//!             [→ BM25] → fusion + adjustments → ranked records
//! ```
//!
//! | Layer | Contents |
//! |-------|----------|
//! | [`domain`] | Record model, error taxonomy, validation, lifecycle, AST chunking, ports |
//! | [`adapters`] | FastEmbed/cached embedding, Qdrant + in-memory stores, pool, hybrid search |
//! | [`infrastructure`] | Layered config, persistent embedding cache, retry policy, security log |
//! | [`services`] | Incremental indexer, doc ingestion, git history, file watcher |
//! | [`application`] | [`MemoryService`] — the public operation surface |
//!
//! ## Example
//!
//! ```rust,no_run
//! use claude_rag::application::MemoryService;
//! use claude_rag::infrastructure::config::ConfigLoader;
//!
//! # async fn example() -> claude_rag::domain::error::Result<()> {
//! let config = ConfigLoader::new().load()?;
//! let service = MemoryService::new(config).await?;
//!
//! let stored = service
//!     .store(
//!         "I prefer Python for backend development",
//!         "preference",
//!         "global",
//!         None,
//!         Some("auto"),
//!         0.8,
//!         &[],
//!         None,
//!     )
//!     .await;
//! assert_eq!(stored.status, "success");
//!
//! let results = service
//!     .retrieve("What language does the user prefer?", 1, None, "semantic", None)
//!     .await;
//! assert_eq!(results.status, "success");
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export the spine of the public API
pub use application::{MemoryService, UpdateFields};
pub use domain::error::{Error, Result};
pub use domain::types::*;
pub use infrastructure::config::{ConfigLoader, RagConfig};
