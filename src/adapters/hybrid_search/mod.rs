//! Hybrid search: BM25 keyword ranking fused with dense similarity
//!
//! The dense branch comes from the vector store's ANN search; the sparse
//! branch is BM25 over the candidate contents. Fusion is either linear
//! (`alpha * semantic + (1 - alpha) * keyword`, default alpha 0.5) or
//! reciprocal-rank fusion with a configured `k`. Post-scoring adjustments
//! (lifecycle decay, importance, trust, stratified context-level caps) live
//! in the engine so every retrieval mode shares them.

mod bm25;
mod engine;

pub use bm25::{BM25Params, BM25Scorer};
pub use engine::HybridRanker;
