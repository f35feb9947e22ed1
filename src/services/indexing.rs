//! Incremental codebase indexing
//!
//! Per-file pipeline: hash the bytes, skip unchanged files, parse into
//! semantic units, encode unit contents through the cached embedder, then
//! replace the file's stored unit set (`delete_where` followed immediately
//! by `batch_upsert`). Readers racing a replacement observe either the old
//! set or the new set, never a mixture of both for one file; per-path async
//! locks serialize concurrent updates of the same file.
//!
//! The per-file hash table is persisted as one sentinel record per file in
//! the collection itself and mirrored in an in-process map. A failed embed
//! or upsert leaves the hash untouched, so the next run retries the file.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::adapters::providers::embedding::CachedEmbedder;
use crate::domain::chunking::{SourceLanguage, SourceParser};
use crate::domain::error::{Error, ParseErrorKind, Result};
use crate::domain::ports::{SharedVectorStore, StoreFilter};
use crate::infrastructure::resilience::RetryPolicy;
use crate::domain::types::{
    CodeUnitPayload, ContextLevel, Embedding, IndexReport, MemoryCategory, MemoryRecord,
    MemoryScope, CONTENT_MAX_BYTES,
};

/// Metadata marker distinguishing hash sentinels from search records
pub const FILE_SENTINEL: &str = "file_sentinel";

/// Directories never descended into during discovery
const SKIPPED_DIRS: &[&str] = &[
    "node_modules",
    "target",
    "dist",
    "build",
    "__pycache__",
    "venv",
    ".venv",
    "vendor",
];

/// Outcome of indexing one file
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// Units replaced; carries (units stored, embeddings computed, cache hits)
    Indexed {
        /// Units upserted for the file
        units: u32,
        /// Model invocations (cache misses)
        embedded: u32,
        /// Cache hits during the encode
        cache_hits: u32,
    },
    /// Hash matched the previous run; nothing touched
    Unchanged,
    /// Unsupported language or empty file
    Skipped,
    /// The file failed; hash not advanced, next run retries
    Failed(String),
}

/// Progress callback: `(file_index, total_files, units_emitted, errors)`
pub type ProgressFn = Arc<dyn Fn(usize, usize, u32, usize) + Send + Sync>;

/// Incremental indexer over a vector store
pub struct CodebaseIndexer {
    store: SharedVectorStore,
    embedder: Arc<CachedEmbedder>,
    parser: SourceParser,
    retry: RetryPolicy,
    /// (project key, absolute path) → file hash
    hashes: DashMap<(String, String), String>,
    /// Per-path serialization of same-file updates
    file_locks: DashMap<String, Arc<Mutex<()>>>,
}

fn project_key(project: Option<&str>) -> String {
    project.unwrap_or("").to_string()
}

impl CodebaseIndexer {
    /// Create an indexer over the given store and embedder
    pub fn new(store: SharedVectorStore, embedder: Arc<CachedEmbedder>) -> Self {
        Self {
            store,
            embedder,
            parser: SourceParser::new(),
            retry: RetryPolicy::default(),
            hashes: DashMap::new(),
            file_locks: DashMap::new(),
        }
    }

    /// Index every supported file under `directory`.
    ///
    /// Sequential across files; cancellation is honored at file boundaries,
    /// leaving already-committed files indexed. Files indexed by a previous
    /// run but missing now have their units deleted.
    pub async fn index_directory(
        &self,
        directory: &Path,
        project: Option<&str>,
        recursive: bool,
        progress: Option<ProgressFn>,
        cancel: Option<CancellationToken>,
    ) -> Result<IndexReport> {
        let started = Instant::now();
        if !directory.is_dir() {
            return Err(Error::not_found(format!(
                "directory {}",
                directory.display()
            )));
        }
        let directory = directory
            .canonicalize()
            .map_err(|e| Error::not_found(format!("{}: {e}", directory.display())))?;

        self.load_hashes(project).await?;
        let files = discover_files(&directory, recursive);
        let total = files.len();

        let mut report = IndexReport::default();
        let mut total_hits = 0u64;
        let mut total_misses = 0u64;

        for (index, path) in files.iter().enumerate() {
            if let Some(cancel) = &cancel {
                if cancel.is_cancelled() {
                    tracing::info!(done = index, total, "indexing cancelled at file boundary");
                    break;
                }
            }
            report.files_indexed += 1;
            match self.index_file(path, project).await {
                Ok(FileOutcome::Indexed {
                    units,
                    embedded,
                    cache_hits,
                }) => {
                    report.units_indexed += units;
                    report.units_embedded += embedded;
                    total_hits += u64::from(cache_hits);
                    total_misses += u64::from(embedded);
                }
                Ok(FileOutcome::Unchanged) => report.files_unchanged += 1,
                Ok(FileOutcome::Skipped) => report.files_skipped += 1,
                Ok(FileOutcome::Failed(detail)) => {
                    report.errors.push(format!("{}: {detail}", path.display()));
                }
                Err(err) => {
                    report.errors.push(format!("{}: {err}", path.display()));
                }
            }
            if let Some(progress) = &progress {
                progress(index + 1, total, report.units_indexed, report.errors.len());
            }
        }

        self.sweep_deleted(&directory, project, &files).await?;

        report.cache_hit_rate = if total_misses == 0 {
            1.0
        } else {
            total_hits as f64 / (total_hits + total_misses) as f64
        };
        report.elapsed_s = started.elapsed().as_secs_f64();
        Ok(report)
    }

    /// Index one file, serialized per path.
    pub async fn index_file(&self, path: &Path, project: Option<&str>) -> Result<FileOutcome> {
        let path_str = path.display().to_string();
        let lock = self
            .file_locks
            .entry(path_str.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let bytes = tokio::fs::read(path).await?;
        let file_hash = hex_digest(&bytes);
        let key = (project_key(project), path_str.clone());

        if self.hashes.get(&key).map(|h| h.clone()) == Some(file_hash.clone()) {
            return Ok(FileOutcome::Unchanged);
        }

        let parsed = match self.parser.parse(path, &bytes) {
            Ok(parsed) => parsed,
            Err(Error::Parse {
                kind: ParseErrorKind::UnsupportedLanguage,
                ..
            }) => return Ok(FileOutcome::Skipped),
            Err(Error::Parse {
                kind: ParseErrorKind::EmptyFile,
                ..
            }) => {
                // The file emptied out; drop whatever was indexed for it.
                self.replace_file_records(path, project, Vec::new(), &file_hash)
                    .await?;
                self.hashes.insert(key, file_hash);
                return Ok(FileOutcome::Skipped);
            }
            Err(err) => return Ok(FileOutcome::Failed(err.to_string())),
        };
        if parsed.syntax_errors {
            tracing::warn!(
                path = %path.display(),
                units = parsed.units.len(),
                "syntax errors; indexing the units that parsed"
            );
        }

        let contents: Vec<String> = parsed
            .units
            .iter()
            .map(|unit| {
                truncate_utf8(
                    format!(
                        "{}:{}\n{}\n{}",
                        path.display(),
                        unit.start_line,
                        unit.signature,
                        unit.body
                    ),
                    CONTENT_MAX_BYTES,
                )
            })
            .collect();

        let encode = match self.embedder.encode_batch(&contents).await {
            Ok(report) => report,
            Err(err) => {
                // Hash stays put so the next run retries this file.
                return Ok(FileOutcome::Failed(err.to_string()));
            }
        };

        let mut records = Vec::with_capacity(parsed.units.len());
        for ((unit, content), vector) in parsed
            .units
            .iter()
            .zip(contents)
            .zip(encode.vectors)
        {
            let mut record = MemoryRecord::new(content, MemoryCategory::Code);
            record.context_level = ContextLevel::ProjectContext;
            record.scope = match project {
                Some(_) => MemoryScope::Project,
                None => MemoryScope::Global,
            };
            record.project_name = project.map(str::to_string);
            record.embedding = Some(Embedding {
                vector,
                model: self.embedder.model_id().to_string(),
            });
            let payload = CodeUnitPayload {
                file_path: path_str.clone(),
                unit_type: unit.kind,
                unit_name: unit.name.clone(),
                start_line: unit.start_line,
                end_line: unit.end_line,
                signature: unit.signature.clone(),
                language: parsed.language.as_str().to_string(),
                file_hash: file_hash.clone(),
            };
            payload.write_metadata(&mut record.metadata);
            if let Some(parent) = &unit.parent {
                record.metadata.insert("parent_class".into(), parent.clone().into());
            }
            if let Some(doc) = &unit.doc {
                record.metadata.insert(
                    "doc_comment".into(),
                    truncate_utf8(doc.clone(), 2048).into(),
                );
            }
            records.push(record);
        }

        let units = records.len() as u32;
        self.replace_file_records(path, project, records, &file_hash)
            .await?;
        self.hashes.insert(key, file_hash);

        Ok(FileOutcome::Indexed {
            units,
            embedded: encode.cache_misses as u32,
            cache_hits: encode.cache_hits as u32,
        })
    }

    /// Delete the file's old records and upsert the new set consecutively.
    async fn replace_file_records(
        &self,
        path: &Path,
        project: Option<&str>,
        mut records: Vec<MemoryRecord>,
        file_hash: &str,
    ) -> Result<()> {
        let path_str = path.display().to_string();
        records.push(self.sentinel_record(&path_str, project, file_hash));

        let filter = StoreFilter::for_file(project, &path_str);
        let store = self.store.clone();
        let delete_filter = filter.clone();
        self.retry
            .run("index_delete_where", move || {
                let store = store.clone();
                let filter = delete_filter.clone();
                async move { store.delete_where(&filter).await.map(|_| ()) }
            })
            .await?;

        let store = self.store.clone();
        let records = Arc::new(records);
        self.retry
            .run("index_batch_upsert", move || {
                let store = store.clone();
                let records = records.clone();
                async move { store.batch_upsert(&records).await.map(|_| ()) }
            })
            .await?;
        Ok(())
    }

    /// Hash sentinel: one zero-information record per file carrying the
    /// file hash, so the delta table survives restarts.
    fn sentinel_record(
        &self,
        path_str: &str,
        project: Option<&str>,
        file_hash: &str,
    ) -> MemoryRecord {
        let mut record = MemoryRecord::new(
            format!("index state for {path_str}"),
            MemoryCategory::Context,
        );
        record.context_level = ContextLevel::ProjectContext;
        record.scope = match project {
            Some(_) => MemoryScope::Project,
            None => MemoryScope::Global,
        };
        record.project_name = project.map(str::to_string);
        record.importance = 0.0;
        // A fixed basis vector keeps sentinels valid for the store's norm
        // check while never ranking near real queries.
        let mut vector = vec![0.0f32; self.embedder.dimensions()];
        vector[0] = 1.0;
        record.embedding = Some(Embedding {
            vector,
            model: self.embedder.model_id().to_string(),
        });
        record.metadata.insert("unit_type".into(), FILE_SENTINEL.into());
        record.metadata.insert("file_path".into(), path_str.into());
        record.metadata.insert("file_hash".into(), file_hash.into());
        record
    }

    /// Populate the in-process hash table from stored sentinels.
    async fn load_hashes(&self, project: Option<&str>) -> Result<()> {
        let key_prefix = project_key(project);
        let filter = StoreFilter {
            project_name: project.map(str::to_string),
            unit_type: None,
            ..StoreFilter::default()
        };
        let mut offset = None;
        loop {
            let page = self.store.scroll(&filter, 256, offset).await?;
            for record in &page.records {
                let is_sentinel = record
                    .metadata
                    .get("unit_type")
                    .and_then(|v| v.as_str())
                    .map(|s| s == FILE_SENTINEL)
                    .unwrap_or(false);
                if !is_sentinel {
                    continue;
                }
                if let (Some(path), Some(hash)) = (
                    record.metadata.get("file_path").and_then(|v| v.as_str()),
                    record.metadata.get("file_hash").and_then(|v| v.as_str()),
                ) {
                    self.hashes
                        .entry((key_prefix.clone(), path.to_string()))
                        .or_insert_with(|| hash.to_string());
                }
            }
            match page.next_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(())
    }

    /// Remove records for files indexed previously but absent from this run.
    async fn sweep_deleted(
        &self,
        directory: &Path,
        project: Option<&str>,
        present: &[PathBuf],
    ) -> Result<()> {
        let key_prefix = project_key(project);
        let dir_str = directory.display().to_string();
        let present: std::collections::HashSet<String> =
            present.iter().map(|p| p.display().to_string()).collect();

        let stale: Vec<String> = self
            .hashes
            .iter()
            .filter(|entry| {
                let (prefix, path) = entry.key();
                *prefix == key_prefix && path.starts_with(&dir_str) && !present.contains(path)
            })
            .map(|entry| entry.key().1.clone())
            .collect();

        for path in stale {
            tracing::info!(path = %path, "file removed; deleting its units");
            self.store
                .delete_where(&StoreFilter::for_file(project, &path))
                .await?;
            self.hashes.remove(&(key_prefix.clone(), path));
        }
        Ok(())
    }
}

/// SHA-256 hex digest
pub fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub(crate) fn truncate_utf8(mut s: String, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s;
    }
    let mut cut = max_bytes;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
    s
}

fn discover_files(directory: &Path, recursive: bool) -> Vec<PathBuf> {
    let mut walker = WalkDir::new(directory).follow_links(false);
    if !recursive {
        walker = walker.max_depth(1);
    }
    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !(entry.file_type().is_dir()
                && (name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())))
        })
        .inspect(|e| eprintln!("DEBUG entry: {:?}", e))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|ext| SourceLanguage::from_extension(ext).is_some())
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_hex() {
        let digest = hex_digest(b"hello");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hex_digest(b"hello"));
        assert_ne!(digest, hex_digest(b"hello!"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "héllo wörld".to_string();
        let cut = truncate_utf8(s, 3);
        assert!(cut.len() <= 3);
        assert!(cut.is_char_boundary(cut.len()));
    }

    #[test]
    fn discovery_filters_unsupported_and_hidden() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "def f():\n    pass\n").unwrap();
        std::fs::write(dir.path().join("b.bin"), [0u8, 1, 2]).unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git").join("c.py"), "x = 1\n").unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules").join("d.js"), "let x = 1;\n").unwrap();

        let files = discover_files(dir.path(), true);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("a.py"));
    }

    #[test]
    fn discovery_non_recursive_stays_shallow() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("top.py"), "x = 1\n").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("deep.py"), "y = 2\n").unwrap();

        assert_eq!(discover_files(dir.path(), false).len(), 1);
        assert_eq!(discover_files(dir.path(), true).len(), 2);
    }
}
