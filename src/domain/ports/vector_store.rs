use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::error::Result;
use crate::domain::types::{
    ContextLevel, LifecycleState, MemoryCategory, MemoryRecord, MemoryScope, UnitKind,
};
use crate::domain::validation::SearchFilters;

/// Server-side filter over payload-indexed fields.
///
/// Every field is an exact-match or range clause the store can evaluate with
/// a payload index. Glob-style `file_pattern` filtering is deliberately not
/// here; it is applied client-side after retrieval.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreFilter {
    /// Exact category match
    pub category: Option<MemoryCategory>,
    /// Exact context level match
    pub context_level: Option<ContextLevel>,
    /// Exact scope match
    pub scope: Option<MemoryScope>,
    /// Exact project match
    pub project_name: Option<String>,
    /// Exact lifecycle state match
    pub lifecycle_state: Option<LifecycleState>,
    /// Exact language match (code records)
    pub language: Option<String>,
    /// Exact file path match (code/doc records)
    pub file_path: Option<String>,
    /// Exact unit kind match (code records)
    pub unit_type: Option<UnitKind>,
    /// Require all of these tags
    pub tags: Vec<String>,
    /// Importance lower bound, inclusive
    pub min_importance: Option<f32>,
    /// Importance upper bound, inclusive
    pub max_importance: Option<f32>,
    /// Created-at lower bound (sent as Unix seconds on the wire)
    pub created_after: Option<DateTime<Utc>>,
    /// Created-at upper bound (sent as Unix seconds on the wire)
    pub created_before: Option<DateTime<Utc>>,
    /// Last-accessed upper bound; used by the session expiry sweep
    pub last_accessed_before: Option<DateTime<Utc>>,
}

impl StoreFilter {
    /// Filter matching every record
    pub fn any() -> Self {
        Self::default()
    }

    /// Filter scoped to one file of one project; used for atomic file
    /// replacement during re-indexing
    pub fn for_file(project_name: Option<&str>, file_path: &str) -> Self {
        Self {
            project_name: project_name.map(str::to_string),
            file_path: Some(file_path.to_string()),
            ..Self::default()
        }
    }

    /// Whether no clause is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl From<&SearchFilters> for StoreFilter {
    fn from(f: &SearchFilters) -> Self {
        Self {
            category: f.category,
            context_level: f.context_level,
            scope: f.scope,
            project_name: f.project_name.clone(),
            lifecycle_state: None,
            language: f.language.clone(),
            file_path: None,
            unit_type: f.unit_type,
            tags: f.tags.clone(),
            min_importance: f.min_importance,
            max_importance: f.max_importance,
            created_after: f.date_from,
            created_before: f.date_to,
            last_accessed_before: None,
        }
    }
}

/// One page of a scroll over the store
#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    /// Records on this page
    pub records: Vec<MemoryRecord>,
    /// Opaque cursor for the next page; `None` when exhausted
    pub next_offset: Option<String>,
}

/// Contract for vector storage backends.
///
/// Implementations are stateless wrappers: every call acquires whatever
/// backend resources it needs and releases them before returning. All
/// mutation of stored records flows through this trait.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection and payload indices if they do not exist
    async fn ensure_collection(&self) -> Result<()>;

    /// Insert or overwrite a single record, returning its id
    async fn upsert(&self, record: &MemoryRecord) -> Result<Uuid>;

    /// Insert or overwrite records in chunked batches (one RPC per chunk,
    /// all-or-nothing per chunk), returning ids in input order
    async fn batch_upsert(&self, records: &[MemoryRecord]) -> Result<Vec<Uuid>>;

    /// Fetch a record by id
    async fn get(&self, id: Uuid) -> Result<Option<MemoryRecord>>;

    /// Delete by id; `false` when the id was unknown
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Delete everything matching the filter, returning the removed count
    async fn delete_where(&self, filter: &StoreFilter) -> Result<u64>;

    /// Top-k cosine search with payload filtering; scores are in [0, 1]
    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: &StoreFilter,
    ) -> Result<Vec<(MemoryRecord, f32)>>;

    /// Page through records matching a filter without scoring
    async fn scroll(
        &self,
        filter: &StoreFilter,
        page_size: usize,
        offset: Option<String>,
    ) -> Result<ScrollPage>;

    /// Exact count of records matching a filter
    async fn count(&self, filter: &StoreFilter) -> Result<u64>;

    /// Names of the collections this store manages
    async fn collections(&self) -> Result<Vec<String>>;

    /// Backend name for status reporting
    fn backend_name(&self) -> &'static str;
}

/// Shared vector store handle
pub type SharedVectorStore = Arc<dyn VectorStore>;
