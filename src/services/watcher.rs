//! Debounced filesystem watcher
//!
//! Subscribes to create/modify/delete/rename events under a directory,
//! coalesces rapid events per path in a bounded buffer, and hands each
//! flush to a change handler as deletes followed by upserts (a rename
//! arrives as delete of the old path plus create of the new one, so the
//! ordering rule makes renames safe). Flushes are serialized: the next one
//! starts only after the handler returns. Shutdown drains the in-flight
//! flush before stopping.

use dashmap::DashMap;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::chunking::SourceLanguage;
use crate::domain::error::{Error, Result};
use crate::infrastructure::config::WatcherConfig;

/// What a buffered event means for the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// File created or modified; re-index it
    Upsert,
    /// File removed; delete its units
    Delete,
}

/// Receives debounced change batches
#[async_trait::async_trait]
pub trait ChangeHandler: Send + Sync {
    /// Apply one flush. `deletes` are applied before `upserts`.
    async fn apply(&self, deletes: Vec<PathBuf>, upserts: Vec<PathBuf>);
}

/// Debounced filesystem watcher driving the indexer
pub struct FileWatcher {
    config: WatcherConfig,
    buffer: Arc<DashMap<PathBuf, (ChangeKind, Instant)>>,
    cancel: CancellationToken,
}

impl FileWatcher {
    /// Create a watcher with the given debounce settings
    pub fn new(config: WatcherConfig) -> Self {
        Self {
            config,
            buffer: Arc::new(DashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the watch loop
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Watch `directory` until cancelled, delivering batches to `handler`.
    pub async fn watch(&self, directory: &Path, handler: Arc<dyn ChangeHandler>) -> Result<()> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(err) => tracing::warn!(error = %err, "filesystem watch error"),
            })
            .map_err(|e| Error::internal(format!("failed to create watcher: {e}")))?;
        watcher
            .watch(directory, RecursiveMode::Recursive)
            .map_err(|e| Error::internal(format!("failed to watch {}: {e}", directory.display())))?;
        tracing::info!(directory = %directory.display(), debounce_ms = self.config.debounce_ms, "watching");

        let debounce = Duration::from_millis(self.config.debounce_ms);
        let mut tick = tokio::time::interval(debounce.min(Duration::from_millis(250)));

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    // Drain: flush whatever is buffered, then stop.
                    self.flush(handler.as_ref(), Duration::ZERO).await;
                    return Ok(());
                }
                maybe_event = event_rx.recv() => {
                    match maybe_event {
                        Some(event) => self.buffer_event(event),
                        None => {
                            self.flush(handler.as_ref(), Duration::ZERO).await;
                            return Ok(());
                        }
                    }
                }
                _ = tick.tick() => {
                    self.flush(handler.as_ref(), debounce).await;
                }
            }
        }
    }

    fn buffer_event(&self, event: Event) {
        let kind = match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => ChangeKind::Upsert,
            EventKind::Remove(_) => ChangeKind::Delete,
            _ => return,
        };
        for path in event.paths {
            if !is_watchable(&path, kind) {
                continue;
            }
            let already_buffered = self.buffer.contains_key(&path);
            if !already_buffered && self.buffer.len() >= self.config.buffer_limit {
                // Bounded buffer: duplicates still coalesce above, but new
                // paths are dropped until a flush makes room.
                tracing::warn!(path = %path.display(), "debounce buffer full, dropping event");
                continue;
            }
            // Last write wins for a path seen twice within the window.
            self.buffer.insert(path, (kind, Instant::now()));
        }
    }

    /// Flush entries older than `min_age`. Deletes go first.
    async fn flush(&self, handler: &dyn ChangeHandler, min_age: Duration) {
        let now = Instant::now();
        let ready: Vec<(PathBuf, ChangeKind)> = self
            .buffer
            .iter()
            .filter(|entry| now.duration_since(entry.value().1) >= min_age)
            .map(|entry| (entry.key().clone(), entry.value().0))
            .collect();
        if ready.is_empty() {
            return;
        }
        for (path, _) in &ready {
            self.buffer.remove(path);
        }

        let mut deletes = Vec::new();
        let mut upserts = Vec::new();
        for (path, kind) in ready {
            match kind {
                ChangeKind::Delete => deletes.push(path),
                ChangeKind::Upsert => upserts.push(path),
            }
        }
        deletes.sort();
        upserts.sort();
        tracing::debug!(
            deletes = deletes.len(),
            upserts = upserts.len(),
            "flushing file changes"
        );
        handler.apply(deletes, upserts).await;
    }
}

/// Upserts must be parseable source files; deletes pass through as long as
/// the extension is supported (the file is already gone, only its stored
/// units matter).
fn is_watchable(path: &Path, kind: ChangeKind) -> bool {
    let supported = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| SourceLanguage::from_extension(ext).is_some())
        .unwrap_or(false);
    if !supported {
        return false;
    }
    match kind {
        ChangeKind::Upsert => path.is_file(),
        ChangeKind::Delete => true,
    }
}
