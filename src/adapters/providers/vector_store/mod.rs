//! Vector store provider implementations
//!
//! | Backend | Persistence | Use case |
//! |---------|-------------|----------|
//! | [`QdrantStore`] | Remote Qdrant | Production |
//! | [`InMemoryStore`] | None | Tests, ephemeral development |
//!
//! Both enforce the same insert invariants (embedding dimension and unit
//! norm) and the same filter semantics, so tests written against the
//! in-memory store exercise the contract the wire adapter implements.

mod in_memory;
mod pool;
mod qdrant;

pub use in_memory::{record_matches, InMemoryStore};
pub use pool::{ConnectionFactory, Pool, PoolGuard, PoolMetrics, PooledConnection};
pub use qdrant::{QdrantConnection, QdrantConnectionFactory, QdrantStore};
