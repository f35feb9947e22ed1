//! Adapters layer: concrete implementations of the domain ports

pub mod hybrid_search;
pub mod providers;
