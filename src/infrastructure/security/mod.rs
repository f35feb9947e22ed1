//! Append-only security event log
//!
//! Validation rejections and read-only violations land here as one JSON
//! object per line: `{ts, op, kind, detail}`. The file is opened in append
//! mode and never truncated or rewritten by the service.

use chrono::Utc;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::domain::error::Result;

/// One security log entry
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    /// RFC 3339 timestamp
    pub ts: String,
    /// Operation being attempted
    pub op: String,
    /// Event kind tag (`injection`, `read_only`, ...)
    pub kind: String,
    /// Detail message; injection candidates arrive already redacted
    pub detail: String,
}

/// Append-only security log handle
pub struct SecurityLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl SecurityLog {
    /// Open (or create) the log at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Append one event; failures are reported but callers typically only
    /// log them, a broken audit trail must not fail the request twice
    pub fn record(&self, op: &str, kind: &str, detail: &str) -> Result<()> {
        let event = SecurityEvent {
            ts: Utc::now().to_rfc3339(),
            op: op.to_string(),
            kind: kind.to_string(),
            detail: detail.to_string(),
        };
        let line = serde_json::to_string(&event)?;
        let mut file = self
            .file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }

    /// Where the log lives
    pub fn path(&self) -> &Path {
        &self.path
    }
}
