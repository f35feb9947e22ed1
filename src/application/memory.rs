//! The public operation surface
//!
//! [`MemoryService`] owns the long-lived handles (config, cache, embedder,
//! store, ranker, indexers, security log) and exposes every public
//! operation as an async method returning the uniform
//! [`Envelope`] (`{status, data?, error?}`). Every operation validates its
//! inputs first, rejects mutations in read-only mode before any I/O, wraps
//! transient storage work in the retry policy, and appends
//! security-relevant rejections to the append-only log.

use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::adapters::hybrid_search::HybridRanker;
use crate::adapters::providers::embedding::{
    CachedEmbedder, FastEmbedProvider, NullEmbeddingProvider,
};
use crate::adapters::providers::vector_store::{InMemoryStore, PoolMetrics, QdrantStore};
use crate::domain::error::{Error, Result, ValidationKind};
use crate::domain::lifecycle;
use crate::domain::ports::{SharedEmbeddingProvider, SharedVectorStore, StoreFilter};
use crate::domain::types::{
    ContextLevel, DocIngestReport, Envelope, GitIndexReport, IndexReport, ListPage, MemoryCategory,
    MemoryRecord, ScoredMemory, SearchMode, StatusReport,
};
use crate::domain::validation::{
    self, parse_date, validate_filters, validate_query_request, validate_store_request,
    validate_text, SearchFilters,
};
use crate::infrastructure::cache::{CacheStats, EmbeddingCache, SharedEmbeddingCache};
use crate::infrastructure::config::RagConfig;
use crate::infrastructure::resilience::RetryPolicy;
use crate::infrastructure::security::SecurityLog;
use crate::services::docs::DocIngestor;
use crate::services::git::{GitIndexer, IncludeDiffs};
use crate::services::indexing::{CodebaseIndexer, ProgressFn, FILE_SENTINEL};
use crate::services::watcher::{ChangeHandler, FileWatcher};

/// Candidate pool multiplier for the dense branch; the ranker needs more
/// than `k` candidates for fusion, caps, and min-score filtering to bite
const CANDIDATE_FACTOR: usize = 4;

/// Candidate cap for pure keyword retrieval (a filtered scroll)
const KEYWORD_CANDIDATES: usize = 256;

/// Partial update for [`MemoryService::update`]
#[derive(Debug, Clone, Default)]
pub struct UpdateFields {
    /// Replace the content (triggers re-embedding)
    pub content: Option<String>,
    /// Replace the importance prior
    pub importance: Option<f32>,
    /// Replace the tag set
    pub tags: Option<Vec<String>>,
    /// Merge these metadata entries
    pub metadata: Option<serde_json::Value>,
    /// Replace the category
    pub category: Option<String>,
    /// Replace the context level
    pub context_level: Option<String>,
}

/// The assembled service
pub struct MemoryService {
    config: Arc<RagConfig>,
    store: SharedVectorStore,
    qdrant: Option<Arc<QdrantStore>>,
    cache: SharedEmbeddingCache,
    embedder: Arc<CachedEmbedder>,
    ranker: HybridRanker,
    indexer: Arc<CodebaseIndexer>,
    docs: DocIngestor,
    git: GitIndexer,
    security_log: SecurityLog,
    retry: RetryPolicy,
    watcher_cancel: CancellationToken,
    started_at: Instant,
}

impl MemoryService {
    /// Assemble the production service: fastembed provider, Qdrant store.
    pub async fn new(config: RagConfig) -> Result<Self> {
        let provider: SharedEmbeddingProvider =
            Arc::new(FastEmbedProvider::new(&config.embedding)?);
        let qdrant = Arc::new(QdrantStore::new(
            &config.storage,
            config.pool.clone(),
            config.embedding.dimension,
        ));
        let store: SharedVectorStore = qdrant.clone();
        store.ensure_collection().await?;
        let cache: SharedEmbeddingCache = Arc::new(EmbeddingCache::open(
            &config.embedding.cache_path,
            config.embedding.cache_ttl_days,
        )?);
        Self::assemble(config, store, Some(qdrant), provider, cache)
    }

    /// Assemble with injected store and provider; the seam tests use, and
    /// the way an ephemeral in-memory deployment is built.
    pub fn with_parts(
        config: RagConfig,
        store: SharedVectorStore,
        provider: SharedEmbeddingProvider,
    ) -> Result<Self> {
        let cache: SharedEmbeddingCache = Arc::new(EmbeddingCache::ephemeral()?);
        Self::assemble(config, store, None, provider, cache)
    }

    /// Fully in-memory service: stub embeddings, map-backed store,
    /// ephemeral cache. What tests and throwaway sandboxes run on.
    pub fn ephemeral(config: RagConfig) -> Result<Self> {
        let dimension = config.embedding.dimension;
        let store: SharedVectorStore = Arc::new(InMemoryStore::new(
            &config.storage.collection_name,
            dimension,
        ));
        let provider: SharedEmbeddingProvider = Arc::new(NullEmbeddingProvider::new(dimension));
        Self::with_parts(config, store, provider)
    }

    fn assemble(
        config: RagConfig,
        store: SharedVectorStore,
        qdrant: Option<Arc<QdrantStore>>,
        provider: SharedEmbeddingProvider,
        cache: SharedEmbeddingCache,
    ) -> Result<Self> {
        config.check()?;
        let embedder = Arc::new(CachedEmbedder::new(
            provider,
            cache.clone(),
            config.embedding.batch_size,
            config.embedding.effective_workers(),
        ));
        let retry = RetryPolicy::default();
        let security_log = SecurityLog::open(&config.security.security_log_path)?;

        Ok(Self {
            ranker: HybridRanker::new(config.hybrid.clone()),
            indexer: Arc::new(CodebaseIndexer::new(store.clone(), embedder.clone())),
            docs: DocIngestor::new(store.clone(), embedder.clone()),
            git: GitIndexer::new(store.clone(), embedder.clone()),
            config: Arc::new(config),
            store,
            qdrant,
            cache,
            embedder,
            security_log,
            retry,
            watcher_cancel: CancellationToken::new(),
            started_at: Instant::now(),
        })
    }

    /// The loaded configuration
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Embedding cache counters
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Connection pool counters, when the store is pooled
    pub fn pool_metrics(&self) -> Option<PoolMetrics> {
        self.qdrant.as_ref().map(|q| q.pool_metrics())
    }

    // ---- operation plumbing -------------------------------------------

    /// Reject mutations in read-only mode before any I/O happens
    fn guard_mutation(&self, op: &str) -> Result<()> {
        if self.config.security.read_only_mode {
            return Err(Error::ReadOnly { op: op.to_string() });
        }
        Ok(())
    }

    /// Translate an internal result into the envelope, logging
    /// security-relevant rejections on the way out
    fn envelope<T>(&self, op: &str, result: Result<T>) -> Envelope<T> {
        match result {
            Ok(data) => Envelope::success(data),
            Err(err) => {
                if err.is_security() || matches!(err, Error::Validation { .. }) {
                    if let Err(log_err) =
                        self.security_log
                            .record(op, err.kind_tag(), &err.to_string())
                    {
                        tracing::error!(error = %log_err, "security log append failed");
                    }
                }
                tracing::debug!(op, error = %err, kind = err.kind_tag(), "operation failed");
                Envelope::failure(&err)
            }
        }
    }

    // ---- memory CRUD ---------------------------------------------------

    /// Store a new memory
    #[allow(clippy::too_many_arguments)]
    pub async fn store(
        &self,
        content: &str,
        category: &str,
        scope: &str,
        project_name: Option<&str>,
        context_level: Option<&str>,
        importance: f32,
        tags: &[String],
        metadata: Option<&serde_json::Value>,
    ) -> Envelope<Uuid> {
        let result = self
            .store_inner(
                content,
                category,
                scope,
                project_name,
                context_level,
                importance,
                tags,
                metadata,
            )
            .await;
        self.envelope("store", result)
    }

    #[allow(clippy::too_many_arguments)]
    async fn store_inner(
        &self,
        content: &str,
        category: &str,
        scope: &str,
        project_name: Option<&str>,
        context_level: Option<&str>,
        importance: f32,
        tags: &[String],
        metadata: Option<&serde_json::Value>,
    ) -> Result<Uuid> {
        self.guard_mutation("store")?;
        let request = validate_store_request(
            content,
            category,
            scope,
            project_name,
            context_level,
            importance,
            tags,
            metadata,
        )?;

        let mut record = MemoryRecord::new(request.content.clone(), request.category);
        record.scope = request.scope;
        record.project_name = request.project_name;
        record.importance = request.importance;
        record.tags = request.tags;
        record.metadata = request.metadata;
        record.context_level = request.context_level.unwrap_or_else(|| {
            lifecycle::infer_context_level(&request.content, request.category)
        });

        let vector = self.embedder.encode(&record.content).await?;
        record.embedding = Some(crate::domain::types::Embedding {
            vector,
            model: self.embedder.model_id().to_string(),
        });

        let store = self.store.clone();
        let stored = record.clone();
        let id = self
            .retry
            .run("store", move || {
                let store = store.clone();
                let record = stored.clone();
                async move { store.upsert(&record).await }
            })
            .await?;
        tracing::info!(id = %id, category = %record.category, "memory stored");
        Ok(id)
    }

    /// Update fields of an existing memory; re-embeds iff content changed
    pub async fn update(&self, id: Uuid, fields: UpdateFields) -> Envelope<MemoryRecord> {
        let result = self.update_inner(id, fields).await;
        self.envelope("update", result)
    }

    async fn update_inner(&self, id: Uuid, fields: UpdateFields) -> Result<MemoryRecord> {
        self.guard_mutation("update")?;

        let mut record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("memory {id}")))?;

        let mut content_changed = false;
        if let Some(content) = fields.content {
            let content =
                validate_text(&content, self.config.security.content_max_bytes, "content")?;
            content_changed = content != record.content;
            record.content = content;
        }
        if let Some(importance) = fields.importance {
            if !(0.0..=1.0).contains(&importance) {
                return Err(Error::validation(
                    ValidationKind::Type,
                    "importance",
                    "must be in [0, 1]",
                ));
            }
            record.importance = importance;
        }
        if let Some(tags) = fields.tags {
            record.tags = tags
                .iter()
                .map(|t| validation::validate_short(t, "tags"))
                .collect::<Result<Vec<_>>>()?;
        }
        if let Some(metadata) = fields.metadata {
            let map = metadata.as_object().ok_or_else(|| {
                Error::validation(ValidationKind::Type, "metadata", "expected an object")
            })?;
            for (key, value) in map {
                record.metadata.insert(key.clone(), value.clone());
            }
        }
        if let Some(category) = fields.category {
            record.category = MemoryCategory::from_string(&category).ok_or_else(|| {
                Error::validation(ValidationKind::Type, "category", "unknown category")
            })?;
        }
        if let Some(level) = fields.context_level {
            record.context_level = ContextLevel::from_string(&level).ok_or_else(|| {
                Error::validation(ValidationKind::Type, "context_level", "unknown context level")
            })?;
        }

        if content_changed {
            let vector = self.embedder.encode(&record.content).await?;
            record.embedding = Some(crate::domain::types::Embedding {
                vector,
                model: self.embedder.model_id().to_string(),
            });
        }
        record.updated_at = Utc::now();

        let store = self.store.clone();
        let updated = record.clone();
        self.retry
            .run("update", move || {
                let store = store.clone();
                let record = updated.clone();
                async move { store.upsert(&record).await }
            })
            .await?;
        Ok(record)
    }

    /// Delete a memory by id
    pub async fn delete(&self, id: Uuid) -> Envelope<bool> {
        let result = async {
            self.guard_mutation("delete")?;
            let store = self.store.clone();
            self.retry
                .run("delete", move || {
                    let store = store.clone();
                    async move { store.delete(id).await }
                })
                .await
        }
        .await;
        self.envelope("delete", result)
    }

    // ---- retrieval -----------------------------------------------------

    /// Ranked retrieval over all memories
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        filters: Option<&serde_json::Value>,
        mode: &str,
        min_score: Option<f32>,
    ) -> Envelope<Vec<ScoredMemory>> {
        let result = async {
            let request = validate_query_request(query, k, filters, mode, min_score)?;
            self.run_query(request, None).await
        }
        .await;
        self.envelope("retrieve", result)
    }

    /// Retrieval pinned to `USER_PREFERENCE`; the pin is not overridable
    pub async fn retrieve_preferences(&self, query: &str, k: usize) -> Envelope<Vec<ScoredMemory>> {
        let result = self
            .retrieve_pinned(query, k, ContextLevel::UserPreference, None)
            .await;
        self.envelope("retrieve_preferences", result)
    }

    /// Retrieval pinned to `PROJECT_CONTEXT`
    pub async fn retrieve_project_context(
        &self,
        query: &str,
        k: usize,
        project_name: Option<&str>,
    ) -> Envelope<Vec<ScoredMemory>> {
        let result = self
            .retrieve_pinned(query, k, ContextLevel::ProjectContext, project_name)
            .await;
        self.envelope("retrieve_project_context", result)
    }

    /// Retrieval pinned to `SESSION_STATE`
    pub async fn retrieve_session_state(
        &self,
        query: &str,
        k: usize,
    ) -> Envelope<Vec<ScoredMemory>> {
        let result = self
            .retrieve_pinned(query, k, ContextLevel::SessionState, None)
            .await;
        self.envelope("retrieve_session_state", result)
    }

    async fn retrieve_pinned(
        &self,
        query: &str,
        k: usize,
        level: ContextLevel,
        project_name: Option<&str>,
    ) -> Result<Vec<ScoredMemory>> {
        let mut request = validate_query_request(query, k, None, "semantic", None)?;
        // Pinned after validation so callers cannot widen the filter.
        request.filters.context_level = Some(level);
        if let Some(project) = project_name {
            request.filters.project_name =
                Some(validation::validate_short(project, "project_name")?);
        }
        self.run_query(request, None).await
    }

    async fn run_query(
        &self,
        request: validation::QueryRequest,
        file_pattern: Option<&str>,
    ) -> Result<Vec<ScoredMemory>> {
        let filter = StoreFilter::from(&request.filters);
        let recency_requested =
            request.filters.date_from.is_some() || request.filters.date_to.is_some();

        let mut candidates: Vec<(MemoryRecord, f32)> = match request.mode {
            SearchMode::Keyword => {
                // Sparse-only: pull the filtered candidate set unscored.
                let mut out = Vec::new();
                let mut offset = None;
                loop {
                    let page = self
                        .store
                        .scroll(&filter, 128, offset)
                        .await?;
                    out.extend(page.records.into_iter().map(|r| (r, 0.0f32)));
                    if out.len() >= KEYWORD_CANDIDATES {
                        break;
                    }
                    match page.next_offset {
                        Some(next) => offset = Some(next),
                        None => break,
                    }
                }
                out
            }
            _ => {
                let vector = self.embedder.encode(&request.query).await?;
                let pool_size = request.k.saturating_mul(CANDIDATE_FACTOR).max(16);
                let store = self.store.clone();
                let filter_clone = filter.clone();
                self.retry
                    .run("search", move || {
                        let store = store.clone();
                        let vector = vector.clone();
                        let filter = filter_clone.clone();
                        async move { store.search(&vector, pool_size, &filter).await }
                    })
                    .await?
            }
        };

        // Hash sentinels are bookkeeping, never results.
        candidates.retain(|(record, _)| {
            record
                .metadata
                .get("unit_type")
                .and_then(|v| v.as_str())
                .map(|s| s != FILE_SENTINEL)
                .unwrap_or(true)
        });

        if let Some(pattern) = file_pattern {
            let compiled = glob::Pattern::new(pattern).map_err(|_| {
                Error::validation(ValidationKind::Type, "file_pattern", "invalid glob pattern")
            })?;
            candidates.retain(|(record, _)| {
                record
                    .metadata
                    .get("file_path")
                    .and_then(|v| v.as_str())
                    .map(|path| compiled.matches(path))
                    .unwrap_or(false)
            });
        }

        let results = self.ranker.rank(
            &request.query,
            request.mode,
            candidates,
            request.k,
            request.min_score,
            recency_requested,
            Utc::now(),
        );

        self.touch(&results);
        Ok(results)
    }

    /// Best-effort access bookkeeping for returned records
    fn touch(&self, results: &[ScoredMemory]) {
        if self.config.security.read_only_mode {
            return;
        }
        let ids: Vec<Uuid> = results.iter().map(|r| r.record.id).collect();
        let store = self.store.clone();
        tokio::spawn(async move {
            let now = Utc::now();
            for id in ids {
                match store.get(id).await {
                    Ok(Some(mut record)) => {
                        record.access_count += 1;
                        record.last_accessed_at = now;
                        if let Err(err) = store.upsert(&record).await {
                            tracing::debug!(id = %id, error = %err, "access touch failed");
                        }
                    }
                    Ok(None) => {}
                    Err(err) => tracing::debug!(id = %id, error = %err, "access touch failed"),
                }
            }
        });
    }

    /// Paged listing with an exact total
    pub async fn list(
        &self,
        filters: Option<&serde_json::Value>,
        offset: usize,
        limit: usize,
    ) -> Envelope<ListPage> {
        let result = self.list_inner(filters, offset, limit).await;
        self.envelope("list", result)
    }

    async fn list_inner(
        &self,
        filters: Option<&serde_json::Value>,
        offset: usize,
        limit: usize,
    ) -> Result<ListPage> {
        if limit == 0 || limit > 100 {
            return Err(Error::validation(
                ValidationKind::Size,
                "limit",
                "must be between 1 and 100",
            ));
        }
        let filters = match filters {
            Some(raw) => validate_filters(raw)?,
            None => SearchFilters::default(),
        };
        let filter = StoreFilter::from(&filters);

        let total = self.store.count(&filter).await?;
        let mut skipped = 0usize;
        let mut results = Vec::with_capacity(limit);
        let mut cursor = None;
        'pages: loop {
            let page = self.store.scroll(&filter, 128, cursor).await?;
            if page.records.is_empty() && page.next_offset.is_none() {
                break;
            }
            for record in page.records {
                if skipped < offset {
                    skipped += 1;
                    continue;
                }
                results.push(record);
                if results.len() == limit {
                    break 'pages;
                }
            }
            match page.next_offset {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let has_more = (offset + results.len()) < total as usize;
        Ok(ListPage {
            results,
            total,
            has_more,
        })
    }

    // ---- code search ---------------------------------------------------

    /// Index a codebase directory
    pub async fn index_codebase(
        &self,
        directory: &str,
        project_name: Option<&str>,
        recursive: bool,
        progress: Option<ProgressFn>,
        cancel: Option<CancellationToken>,
    ) -> Envelope<IndexReport> {
        let result = async {
            self.guard_mutation("index_codebase")?;
            let project = match project_name {
                Some(p) => Some(validation::validate_short(p, "project_name")?),
                None => None,
            };
            self.indexer
                .index_directory(
                    Path::new(directory),
                    project.as_deref(),
                    recursive,
                    progress,
                    cancel,
                )
                .await
        }
        .await;
        self.envelope("index_codebase", result)
    }

    /// Semantic/keyword/hybrid search over indexed code units
    pub async fn search_code(
        &self,
        query: &str,
        project_name: Option<&str>,
        k: usize,
        file_pattern: Option<&str>,
        language: Option<&str>,
        mode: &str,
    ) -> Envelope<Vec<ScoredMemory>> {
        let result = self
            .search_code_inner(query, project_name, k, file_pattern, language, mode)
            .await;
        self.envelope("search_code", result)
    }

    async fn search_code_inner(
        &self,
        query: &str,
        project_name: Option<&str>,
        k: usize,
        file_pattern: Option<&str>,
        language: Option<&str>,
        mode: &str,
    ) -> Result<Vec<ScoredMemory>> {
        let project = self.resolve_project(project_name, "search_code")?;
        let mut request = validate_query_request(query, k, None, mode, None)?;
        request.filters.category = Some(MemoryCategory::Code);
        request.filters.project_name = project;
        if let Some(language) = language {
            request.filters.language =
                Some(validation::validate_short(language, "language")?.to_lowercase());
        }
        let file_pattern = match file_pattern {
            Some(p) => Some(validation::validate_short(p, "file_pattern")?),
            None => None,
        };
        self.run_query(request, file_pattern.as_deref()).await
    }

    /// Resolve the target project for code search. With a current project
    /// configured, reaching into any other project requires that project to
    /// be opted in via configuration.
    fn resolve_project(&self, requested: Option<&str>, op: &str) -> Result<Option<String>> {
        let current = self.config.search.current_project.as_deref();
        match requested {
            None => Ok(current.map(str::to_string)),
            Some(project) => {
                let project = validation::validate_short(project, "project_name")?;
                if current.is_none() || Some(project.as_str()) == current {
                    return Ok(Some(project));
                }
                if self
                    .config
                    .search
                    .cross_project_opt_in
                    .iter()
                    .any(|p| p == &project)
                {
                    return Ok(Some(project));
                }
                Err(Error::security(
                    op,
                    format!("project `{project}` is not opted in for cross-project search"),
                ))
            }
        }
    }

    // ---- docs & git ----------------------------------------------------

    /// Ingest markdown documentation
    pub async fn ingest_docs(
        &self,
        directory: &str,
        project_name: Option<&str>,
    ) -> Envelope<DocIngestReport> {
        let result = async {
            self.guard_mutation("ingest_docs")?;
            let project = match project_name {
                Some(p) => Some(validation::validate_short(p, "project_name")?),
                None => None,
            };
            self.docs
                .ingest_directory(Path::new(directory), project.as_deref())
                .await
        }
        .await;
        self.envelope("ingest_docs", result)
    }

    /// Index a git repository's history
    pub async fn index_git(
        &self,
        repo_path: &str,
        project_name: Option<&str>,
        include_diffs: &str,
    ) -> Envelope<GitIndexReport> {
        let result = async {
            self.guard_mutation("index_git")?;
            let project = match project_name {
                Some(p) => Some(validation::validate_short(p, "project_name")?),
                None => None,
            };
            let diffs = IncludeDiffs::from_string(include_diffs).ok_or_else(|| {
                Error::validation(
                    ValidationKind::Type,
                    "include_diffs",
                    "expected auto, always, or never",
                )
            })?;
            self.git
                .index_repository(Path::new(repo_path), project.as_deref(), diffs)
                .await
        }
        .await;
        self.envelope("index_git", result)
    }

    /// Semantic search over indexed commits with optional date bounds
    pub async fn search_git_commits(
        &self,
        query: &str,
        commits_after: Option<&str>,
        commits_before: Option<&str>,
        k: usize,
    ) -> Envelope<Vec<ScoredMemory>> {
        let result = async {
            let mut request = validate_query_request(query, k, None, "semantic", None)?;
            request.filters.category = Some(MemoryCategory::Commit);
            if let Some(after) = commits_after {
                request.filters.date_from = Some(parse_date(after, "commits_after")?);
            }
            if let Some(before) = commits_before {
                request.filters.date_to = Some(parse_date(before, "commits_before")?);
            }
            self.run_query(request, None).await
        }
        .await;
        self.envelope("search_git_commits", result)
    }

    // ---- lifecycle & status --------------------------------------------

    /// Delete session-state records inactive beyond the expiry window
    pub async fn expire_sessions(&self) -> Envelope<u64> {
        let result = async {
            self.guard_mutation("expire_sessions")?;
            let cutoff: DateTime<Utc> =
                Utc::now() - chrono::Duration::hours(lifecycle::SESSION_EXPIRY_HOURS);
            let filter = StoreFilter {
                context_level: Some(ContextLevel::SessionState),
                last_accessed_before: Some(cutoff),
                ..StoreFilter::default()
            };
            let removed = self.store.delete_where(&filter).await?;
            if removed > 0 {
                tracing::info!(removed, "expired session-state memories");
            }
            Ok(removed)
        }
        .await;
        self.envelope("expire_sessions", result)
    }

    /// Service status snapshot
    pub async fn get_status(&self) -> Envelope<StatusReport> {
        let result = async {
            let memory_count = self.store.count(&StoreFilter::any()).await?;
            let collections = self.store.collections().await?;
            Ok(StatusReport {
                storage_backend: self.store.backend_name().to_string(),
                read_only_mode: self.config.security.read_only_mode,
                memory_count,
                collections,
                uptime_s: self.started_at.elapsed().as_secs(),
            })
        }
        .await;
        self.envelope("get_status", result)
    }

    /// Watch a directory, re-indexing debounced file changes until
    /// [`MemoryService::stop_watcher`] is called
    pub async fn watch(&self, directory: &str, project_name: Option<&str>) -> Envelope<()> {
        let result = async {
            self.guard_mutation("watch")?;
            if !self.config.watcher.enabled {
                return Err(Error::config("file watcher is disabled"));
            }
            let project = match project_name {
                Some(p) => Some(validation::validate_short(p, "project_name")?),
                None => None,
            };
            let watcher = FileWatcher::new(self.config.watcher.clone());
            let cancel = self.watcher_cancel.clone();
            let inner = watcher.cancellation_token();
            tokio::spawn(async move {
                cancel.cancelled().await;
                inner.cancel();
            });
            let handler: Arc<dyn ChangeHandler> = Arc::new(IndexingHandler {
                store: self.store.clone(),
                indexer: self.indexer.clone(),
                project,
            });
            watcher.watch(Path::new(directory), handler).await
        }
        .await;
        self.envelope("watch", result)
    }

    /// Stop a running watch loop
    pub fn stop_watcher(&self) {
        self.watcher_cancel.cancel();
    }

    /// Flush caches and close pooled connections
    pub async fn shutdown(&self) {
        self.stop_watcher();
        if let Err(err) = self.cache.flush() {
            tracing::warn!(error = %err, "embedding cache flush failed");
        }
        if let Some(qdrant) = &self.qdrant {
            qdrant.shutdown().await;
        }
        tracing::info!("memory service shut down");
    }
}

/// Bridges watcher flushes into the indexer: stale paths lose their stored
/// units first, then changed paths re-index.
struct IndexingHandler {
    store: SharedVectorStore,
    indexer: Arc<CodebaseIndexer>,
    project: Option<String>,
}

#[async_trait::async_trait]
impl ChangeHandler for IndexingHandler {
    async fn apply(&self, deletes: Vec<std::path::PathBuf>, upserts: Vec<std::path::PathBuf>) {
        for path in deletes {
            let filter =
                StoreFilter::for_file(self.project.as_deref(), &path.display().to_string());
            if let Err(err) = self.store.delete_where(&filter).await {
                tracing::warn!(path = %path.display(), error = %err, "delete on watch failed");
            }
        }
        for path in upserts {
            if let Err(err) = self
                .indexer
                .index_file(&path, self.project.as_deref())
                .await
            {
                tracing::warn!(path = %path.display(), error = %err, "re-index on watch failed");
            }
        }
    }
}
