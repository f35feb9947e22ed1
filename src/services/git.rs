//! Git history indexing
//!
//! Walks a repository's history, turning each commit into a record whose
//! content is the commit message plus the touched file list, with author,
//! date, and churn stats in the payload. Record timestamps are set to the
//! commit date so server-side date filters apply to commits directly.
//!
//! Diff bodies are optional: `IncludeDiffs::Auto` disables them once a
//! repository exceeds 10 000 commits, keeping index size and walk time
//! bounded. Record ids derive from the commit hash, so re-indexing
//! overwrites instead of duplicating.

use chrono::{DateTime, Utc};
use git2::{Diff, DiffFormat, DiffOptions, Repository, Sort};
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

use crate::adapters::providers::embedding::CachedEmbedder;
use crate::domain::error::{Error, Result};
use crate::domain::ports::SharedVectorStore;
use crate::domain::types::{
    CommitPayload, ContextLevel, Embedding, GitIndexReport, MemoryCategory, MemoryRecord,
    MemoryScope, CONTENT_MAX_BYTES,
};

/// Commit-count threshold above which `Auto` drops diff bodies
const AUTO_DIFF_LIMIT: usize = 10_000;

/// Per-commit diff body cap in bytes
const DIFF_MAX_BYTES: usize = 8_192;

/// Whether to index diff bodies alongside commit messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncludeDiffs {
    /// Include diffs unless the repository is very large
    #[default]
    Auto,
    /// Always include
    Always,
    /// Never include
    Never,
}

impl IncludeDiffs {
    /// Parse the wire value; `auto` is the default
    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            "always" | "true" => Some(Self::Always),
            "never" | "false" => Some(Self::Never),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct RawCommit {
    hash: String,
    author: String,
    author_email: String,
    date_unix: f64,
    summary: String,
    body: String,
    files: Vec<String>,
    insertions: u32,
    deletions: u32,
    diff: Option<String>,
}

/// Git history indexer
pub struct GitIndexer {
    store: SharedVectorStore,
    embedder: std::sync::Arc<CachedEmbedder>,
}

impl GitIndexer {
    /// Create an indexer over the given store and embedder
    pub fn new(store: SharedVectorStore, embedder: std::sync::Arc<CachedEmbedder>) -> Self {
        Self { store, embedder }
    }

    /// Index the full history reachable from HEAD
    pub async fn index_repository(
        &self,
        repo_path: &Path,
        project: Option<&str>,
        include_diffs: IncludeDiffs,
    ) -> Result<GitIndexReport> {
        let started = Instant::now();
        let path: PathBuf = repo_path.to_path_buf();

        // libgit2 is blocking; the walk happens off the async runtime.
        let (commits, diffs_included) =
            tokio::task::spawn_blocking(move || collect_commits(&path, include_diffs))
                .await
                .map_err(|e| Error::internal(format!("git walk task panicked: {e}")))??;

        let contents: Vec<String> = commits.iter().map(commit_content).collect();
        let mut indexed = 0u32;

        // Encode and upsert in bounded slices so one huge repository does
        // not hold a single giant batch in memory.
        for (commit_chunk, content_chunk) in commits.chunks(256).zip(contents.chunks(256)) {
            let encoded = self.embedder.encode_batch(content_chunk).await?;
            let mut records = Vec::with_capacity(commit_chunk.len());
            for ((commit, content), vector) in commit_chunk
                .iter()
                .zip(content_chunk)
                .zip(encoded.vectors)
            {
                records.push(self.commit_record(commit, content.clone(), vector, project));
            }
            self.store.batch_upsert(&records).await?;
            indexed += records.len() as u32;
        }

        Ok(GitIndexReport {
            commits_indexed: indexed,
            diffs_included,
            elapsed_s: started.elapsed().as_secs_f64(),
        })
    }

    fn commit_record(
        &self,
        commit: &RawCommit,
        content: String,
        vector: Vec<f32>,
        project: Option<&str>,
    ) -> MemoryRecord {
        let mut record = MemoryRecord::new(content, MemoryCategory::Commit);
        record.id = commit_uuid(&commit.hash);
        record.context_level = ContextLevel::ProjectContext;
        record.scope = match project {
            Some(_) => MemoryScope::Project,
            None => MemoryScope::Global,
        };
        record.project_name = project.map(str::to_string);

        // Date filters key off the record timestamps, so commits carry
        // their commit date rather than the indexing time.
        let commit_time: DateTime<Utc> = DateTime::from_timestamp(commit.date_unix as i64, 0)
            .unwrap_or_else(Utc::now);
        record.created_at = commit_time;
        record.updated_at = commit_time;
        record.last_accessed_at = commit_time;

        record.embedding = Some(Embedding {
            vector,
            model: self.embedder.model_id().to_string(),
        });
        CommitPayload {
            commit_hash: commit.hash.clone(),
            author: commit.author.clone(),
            author_email: commit.author_email.clone(),
            commit_date_unix: commit.date_unix,
            files_changed: commit.files.len() as u32,
            insertions: commit.insertions,
            deletions: commit.deletions,
            diff_content: commit.diff.clone(),
        }
        .write_metadata(&mut record.metadata);
        record
    }
}

/// Deterministic record id from the commit hash, so re-indexing overwrites
fn commit_uuid(hash: &str) -> Uuid {
    let mut bytes = [0u8; 16];
    for (i, chunk) in hash.as_bytes().chunks(2).take(16).enumerate() {
        let hex = std::str::from_utf8(chunk).unwrap_or("00");
        bytes[i] = u8::from_str_radix(hex, 16).unwrap_or(0);
    }
    Uuid::from_bytes(bytes)
}

fn commit_content(commit: &RawCommit) -> String {
    let mut content = format!(
        "{}\n{}\nfiles: {}",
        commit.summary,
        commit.body,
        commit.files.join(", ")
    );
    if let Some(diff) = &commit.diff {
        content.push('\n');
        content.push_str(diff);
    }
    crate::services::indexing::truncate_utf8(content, CONTENT_MAX_BYTES)
}

fn collect_commits(
    path: &Path,
    include_diffs: IncludeDiffs,
) -> Result<(Vec<RawCommit>, bool)> {
    let repo = Repository::discover(path)
        .map_err(|e| Error::not_found(format!("git repository at {}: {e}", path.display())))?;

    let mut walk = repo
        .revwalk()
        .map_err(|e| Error::internal(format!("revwalk: {e}")))?;
    walk.push_head()
        .map_err(|e| Error::not_found(format!("repository HEAD: {e}")))?;
    walk.set_sorting(Sort::TIME)
        .map_err(|e| Error::internal(format!("revwalk sorting: {e}")))?;

    let oids: Vec<git2::Oid> = walk.filter_map(|oid| oid.ok()).collect();
    let diffs_included = match include_diffs {
        IncludeDiffs::Always => true,
        IncludeDiffs::Never => false,
        IncludeDiffs::Auto => oids.len() <= AUTO_DIFF_LIMIT,
    };

    let mut commits = Vec::with_capacity(oids.len());
    for oid in oids {
        let commit = match repo.find_commit(oid) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(oid = %oid, error = %e, "skipping unreadable commit");
                continue;
            }
        };

        let tree = commit.tree().ok();
        let parent_tree = commit.parent(0).ok().and_then(|p| p.tree().ok());
        let mut options = DiffOptions::new();
        let diff = repo
            .diff_tree_to_tree(parent_tree.as_ref(), tree.as_ref(), Some(&mut options))
            .ok();

        let (files, insertions, deletions) = match &diff {
            Some(diff) => {
                let mut files = Vec::new();
                diff.foreach(
                    &mut |delta, _| {
                        if let Some(p) = delta.new_file().path() {
                            files.push(p.display().to_string());
                        }
                        true
                    },
                    None,
                    None,
                    None,
                )
                .ok();
                let stats = diff.stats().ok();
                (
                    files,
                    stats.as_ref().map(|s| s.insertions() as u32).unwrap_or(0),
                    stats.as_ref().map(|s| s.deletions() as u32).unwrap_or(0),
                )
            }
            None => (Vec::new(), 0, 0),
        };

        let diff_text = if diffs_included {
            diff.as_ref().and_then(render_diff)
        } else {
            None
        };

        let author = commit.author();
        commits.push(RawCommit {
            hash: oid.to_string(),
            author: author.name().unwrap_or("unknown").to_string(),
            author_email: author.email().unwrap_or("").to_string(),
            date_unix: commit.time().seconds() as f64,
            summary: commit.summary().unwrap_or("").to_string(),
            body: commit.body().unwrap_or("").to_string(),
            files,
            insertions,
            deletions,
            diff: diff_text,
        });
    }
    Ok((commits, diffs_included))
}

fn render_diff(diff: &Diff<'_>) -> Option<String> {
    let mut out = String::new();
    diff.print(DiffFormat::Patch, |_, _, line| {
        if out.len() >= DIFF_MAX_BYTES {
            return false;
        }
        let origin = line.origin();
        if matches!(origin, '+' | '-' | ' ') {
            out.push(origin);
        }
        out.push_str(std::str::from_utf8(line.content()).unwrap_or(""));
        true
    })
    .ok();
    if out.is_empty() {
        None
    } else {
        Some(crate::services::indexing::truncate_utf8(out, DIFF_MAX_BYTES))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_uuid_is_deterministic_and_distinct() {
        let a = commit_uuid("a1b2c3d4e5f60718293a4b5c6d7e8f9012345678");
        let b = commit_uuid("a1b2c3d4e5f60718293a4b5c6d7e8f9012345678");
        let c = commit_uuid("ffffffffffffffffffffffffffffffffffffffff");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn include_diffs_parses() {
        assert_eq!(IncludeDiffs::from_string("auto"), Some(IncludeDiffs::Auto));
        assert_eq!(
            IncludeDiffs::from_string("always"),
            Some(IncludeDiffs::Always)
        );
        assert_eq!(IncludeDiffs::from_string("never"), Some(IncludeDiffs::Never));
        assert_eq!(IncludeDiffs::from_string("sometimes"), None);
    }

    #[test]
    fn content_carries_message_and_files() {
        let commit = RawCommit {
            hash: "ab".repeat(20),
            author: "Dev".into(),
            author_email: "dev@example.com".into(),
            date_unix: 1_704_067_200.0,
            summary: "fix auth token refresh".into(),
            body: "Tokens expired one hour early.".into(),
            files: vec!["src/auth.rs".into(), "src/token.rs".into()],
            insertions: 12,
            deletions: 3,
            diff: None,
        };
        let content = commit_content(&commit);
        assert!(content.starts_with("fix auth token refresh"));
        assert!(content.contains("files: src/auth.rs, src/token.rs"));
    }
}
