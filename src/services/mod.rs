//! Services layer: indexing pipelines and the filesystem watcher

pub mod docs;
pub mod git;
pub mod indexing;
pub mod watcher;
