//! Embedding provider implementations
//!
//! | Provider | Model | Deployment | Use case |
//! |----------|-------|------------|----------|
//! | [`FastEmbedProvider`] | 384-dim sentence encoders | Local ONNX | Default |
//! | [`NullEmbeddingProvider`] | SHA-256 derived | N/A | Tests, stubs |
//!
//! Providers return raw model output; [`CachedEmbedder`] layers the
//! persistent cache, batching, bounded parallelism, and L2 normalization on
//! top, so application code never talks to a bare provider.

mod cached;
mod fastembed;
mod null;

pub use cached::{l2_normalize, CachedEmbedder, EncodeReport};
pub use fastembed::FastEmbedProvider;
pub use null::NullEmbeddingProvider;
