//! Core domain model for the memory service
//!
//! Defines the universal stored unit ([`MemoryRecord`]) and the enums that
//! stratify it, plus the payload extensions carried inside `metadata` for
//! code units, doc chunks, and git commits.
//!
//! ## Core Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`MemoryRecord`] | The universal stored unit (content + embedding + payload) |
//! | [`Embedding`] | L2-normalized vector representation of text |
//! | [`MemoryCategory`] | What kind of memory a record holds |
//! | [`ContextLevel`] | Retrieval stratification (user / project / session) |
//! | [`LifecycleState`] | Coarse age classification with a search weight |
//! | [`ScoredMemory`] | Ranked retrieval result with component scores |
//!
//! The record invariants (embedding dimension/norm, timestamp ordering,
//! code-unit uniqueness) are enforced at the seams: the embedder normalizes,
//! the vector store validates dimensions on insert, and the indexer replaces
//! per-file unit sets atomically from the reader's perspective.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

/// Maximum content size per record, in bytes (50 KiB)
pub const CONTENT_MAX_BYTES: usize = 51_200;

/// Maximum number of tags per record
pub const MAX_TAGS: usize = 32;

/// Dense vector representation of text
///
/// Vectors are L2-normalized before storage; the store rejects inserts whose
/// norm deviates from 1.0 by more than `1e-3`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, Validate)]
pub struct Embedding {
    /// The embedding vector values
    #[validate(length(min = 1, message = "Embedding vector cannot be empty"))]
    pub vector: Vec<f32>,
    /// Name of the model that generated this embedding
    #[validate(length(min = 1, message = "Model name cannot be empty"))]
    pub model: String,
}

impl Embedding {
    /// Vector dimensionality
    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }

    /// Euclidean norm of the vector
    pub fn l2_norm(&self) -> f32 {
        self.vector.iter().map(|v| v * v).sum::<f32>().sqrt()
    }
}

/// What kind of memory a record holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    /// A user preference ("prefers Python for backend work")
    Preference,
    /// A standalone fact
    #[default]
    Fact,
    /// Something that happened at a point in time
    Event,
    /// A how-to or recurring procedure
    Workflow,
    /// Ambient project/session context
    Context,
    /// A semantic unit extracted from source code
    Code,
    /// A chunk of project documentation
    Doc,
    /// A git commit
    Commit,
}

impl MemoryCategory {
    /// Parse a category string into the enum variant
    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "preference" => Some(Self::Preference),
            "fact" => Some(Self::Fact),
            "event" => Some(Self::Event),
            "workflow" => Some(Self::Workflow),
            "context" => Some(Self::Context),
            "code" => Some(Self::Code),
            "doc" => Some(Self::Doc),
            "commit" => Some(Self::Commit),
            _ => None,
        }
    }

    /// All category names accepted by filters
    pub fn supported_categories() -> &'static [&'static str] {
        &[
            "preference",
            "fact",
            "event",
            "workflow",
            "context",
            "code",
            "doc",
            "commit",
        ]
    }
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Preference => "preference",
            Self::Fact => "fact",
            Self::Event => "event",
            Self::Workflow => "workflow",
            Self::Context => "context",
            Self::Code => "code",
            Self::Doc => "doc",
            Self::Commit => "commit",
        };
        write!(f, "{s}")
    }
}

/// Retrieval stratification by intended scope of a memory
///
/// The specialized retrieval operations pin this filter server-side so a
/// caller can never widen it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextLevel {
    /// User-wide, survives across projects and sessions
    UserPreference,
    /// Scoped to a project, never expires on age alone
    #[default]
    ProjectContext,
    /// Scoped to a session; eligible for expiry after 48 h of inactivity
    SessionState,
}

impl ContextLevel {
    /// Parse a context level string into the enum variant
    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "USER_PREFERENCE" => Some(Self::UserPreference),
            "PROJECT_CONTEXT" => Some(Self::ProjectContext),
            "SESSION_STATE" => Some(Self::SessionState),
            _ => None,
        }
    }

    /// Stable wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserPreference => "USER_PREFERENCE",
            Self::ProjectContext => "PROJECT_CONTEXT",
            Self::SessionState => "SESSION_STATE",
        }
    }
}

impl std::fmt::Display for ContextLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Visibility scope of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    /// Visible everywhere
    #[default]
    Global,
    /// Tied to one project (`project_name` required)
    Project,
    /// Tied to one session (`project_name` required)
    Session,
}

impl MemoryScope {
    /// Parse a scope string into the enum variant
    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "global" => Some(Self::Global),
            "project" => Some(Self::Project),
            "session" => Some(Self::Session),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Global => "global",
            Self::Project => "project",
            Self::Session => "session",
        };
        write!(f, "{s}")
    }
}

/// Coarse age classification used to down-weight stale content in ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Accessed within the last 7 days
    #[default]
    Active,
    /// Accessed within the last 30 days
    Recent,
    /// Accessed within the last 180 days
    Archived,
    /// Not accessed for more than 180 days
    Stale,
}

impl LifecycleState {
    /// Multiplicative search weight applied during ranking
    pub fn search_weight(&self) -> f32 {
        match self {
            Self::Active => 1.0,
            Self::Recent => 0.7,
            Self::Archived => 0.3,
            Self::Stale => 0.1,
        }
    }

    /// Parse a lifecycle state string into the enum variant
    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Some(Self::Active),
            "RECENT" => Some(Self::Recent),
            "ARCHIVED" => Some(Self::Archived),
            "STALE" => Some(Self::Stale),
            _ => None,
        }
    }

    /// Stable wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Recent => "RECENT",
            Self::Archived => "ARCHIVED",
            Self::Stale => "STALE",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The universal stored unit
///
/// Every searchable thing in the system (free-form memory, code unit, doc
/// chunk, commit) is one of these. Payload-specific fields live in
/// `metadata`; the typed views ([`CodeUnitPayload`] and friends) nest and
/// flatten deterministically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct MemoryRecord {
    /// Opaque 128-bit identifier, assigned on first insert, never reused
    pub id: Uuid,
    /// UTF-8 text, 1 byte to 50 KiB
    #[validate(length(min = 1, max = 51200))]
    pub content: String,
    /// L2-normalized embedding; absent only before encoding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
    /// What kind of memory this is
    pub category: MemoryCategory,
    /// Retrieval stratification level
    pub context_level: ContextLevel,
    /// Visibility scope
    pub scope: MemoryScope,
    /// Present iff `scope != Global`
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 256))]
    pub project_name: Option<String>,
    /// Relevance prior in [0, 1]
    #[validate(range(min = 0.0, max = 1.0))]
    pub importance: f32,
    /// Coarse age classification
    pub lifecycle_state: LifecycleState,
    /// Short labels, at most 32
    #[validate(length(max = 32))]
    pub tags: Vec<String>,
    /// Creation timestamp (UTC)
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp (UTC)
    pub updated_at: DateTime<Utc>,
    /// Last retrieval timestamp (UTC)
    pub last_accessed_at: DateTime<Utc>,
    /// Monotonically increasing retrieval counter
    pub access_count: u64,
    /// Payload-specific fields (string → scalar), order-stable
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl MemoryRecord {
    /// Build a record with fresh id and timestamps and sane defaults
    pub fn new<S: Into<String>>(content: S, category: MemoryCategory) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            embedding: None,
            category,
            context_level: ContextLevel::default(),
            scope: MemoryScope::default(),
            project_name: None,
            importance: 0.5,
            lifecycle_state: LifecycleState::Active,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            last_accessed_at: now,
            access_count: 0,
            metadata: BTreeMap::new(),
        }
    }

    /// Typed view of the code-unit payload fields, if this is a code record
    pub fn code_unit(&self) -> Option<CodeUnitPayload> {
        if self.category != MemoryCategory::Code {
            return None;
        }
        CodeUnitPayload::from_metadata(&self.metadata)
    }

    /// Typed view of the commit payload fields, if this is a commit record
    pub fn commit(&self) -> Option<CommitPayload> {
        if self.category != MemoryCategory::Commit {
            return None;
        }
        CommitPayload::from_metadata(&self.metadata)
    }
}

/// Kind of semantic unit extracted from source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// Free function
    Function,
    /// Class / struct-with-impl
    Class,
    /// Method belonging to a class
    Method,
}

impl UnitKind {
    /// Stable wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Method => "method",
        }
    }

    /// Parse a unit kind string
    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "function" => Some(Self::Function),
            "class" => Some(Self::Class),
            "method" => Some(Self::Method),
            _ => None,
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payload extension for code-unit records, stored inside `metadata`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeUnitPayload {
    /// Source file path
    pub file_path: String,
    /// Unit kind
    pub unit_type: UnitKind,
    /// Unit name (function/class/method identifier)
    pub unit_name: String,
    /// 1-based starting line
    pub start_line: u32,
    /// 1-based ending line
    pub end_line: u32,
    /// Parameter list + return type as written in source
    pub signature: String,
    /// Source language name
    pub language: String,
    /// SHA-256 of the file the unit came from
    pub file_hash: String,
}

impl CodeUnitPayload {
    /// Flatten into metadata entries
    pub fn write_metadata(&self, meta: &mut BTreeMap<String, serde_json::Value>) {
        meta.insert("file_path".into(), self.file_path.clone().into());
        meta.insert("unit_type".into(), self.unit_type.as_str().into());
        meta.insert("unit_name".into(), self.unit_name.clone().into());
        meta.insert("start_line".into(), self.start_line.into());
        meta.insert("end_line".into(), self.end_line.into());
        meta.insert("signature".into(), self.signature.clone().into());
        meta.insert("language".into(), self.language.clone().into());
        meta.insert("file_hash".into(), self.file_hash.clone().into());
    }

    /// Re-nest from metadata entries
    pub fn from_metadata(meta: &BTreeMap<String, serde_json::Value>) -> Option<Self> {
        Some(Self {
            file_path: meta.get("file_path")?.as_str()?.to_string(),
            unit_type: UnitKind::from_string(meta.get("unit_type")?.as_str()?)?,
            unit_name: meta.get("unit_name")?.as_str()?.to_string(),
            start_line: meta.get("start_line")?.as_u64()? as u32,
            end_line: meta.get("end_line")?.as_u64()? as u32,
            signature: meta
                .get("signature")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            language: meta
                .get("language")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            file_hash: meta
                .get("file_hash")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        })
    }
}

/// Payload extension for documentation chunks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocChunkPayload {
    /// Source file path
    pub file_path: String,
    /// 1-based starting line
    pub start_line: u32,
    /// 1-based ending line
    pub end_line: u32,
    /// Breadcrumb of headings, e.g. `"Install > Linux"`
    pub heading_path: String,
}

impl DocChunkPayload {
    /// Flatten into metadata entries
    pub fn write_metadata(&self, meta: &mut BTreeMap<String, serde_json::Value>) {
        meta.insert("file_path".into(), self.file_path.clone().into());
        meta.insert("start_line".into(), self.start_line.into());
        meta.insert("end_line".into(), self.end_line.into());
        meta.insert("heading_path".into(), self.heading_path.clone().into());
    }

    /// Re-nest from metadata entries
    pub fn from_metadata(meta: &BTreeMap<String, serde_json::Value>) -> Option<Self> {
        Some(Self {
            file_path: meta.get("file_path")?.as_str()?.to_string(),
            start_line: meta.get("start_line")?.as_u64()? as u32,
            end_line: meta.get("end_line")?.as_u64()? as u32,
            heading_path: meta
                .get("heading_path")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        })
    }
}

/// Payload extension for git commit records
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitPayload {
    /// 40-hex commit id
    pub commit_hash: String,
    /// Author name
    pub author: String,
    /// Author e-mail
    pub author_email: String,
    /// Commit timestamp as Unix seconds
    pub commit_date_unix: f64,
    /// Number of files touched
    pub files_changed: u32,
    /// Lines added
    pub insertions: u32,
    /// Lines removed
    pub deletions: u32,
    /// Truncated diff body, when diff indexing is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_content: Option<String>,
}

impl CommitPayload {
    /// Flatten into metadata entries
    pub fn write_metadata(&self, meta: &mut BTreeMap<String, serde_json::Value>) {
        meta.insert("commit_hash".into(), self.commit_hash.clone().into());
        meta.insert("author".into(), self.author.clone().into());
        meta.insert("author_email".into(), self.author_email.clone().into());
        meta.insert("commit_date_unix".into(), self.commit_date_unix.into());
        meta.insert("files_changed".into(), self.files_changed.into());
        meta.insert("insertions".into(), self.insertions.into());
        meta.insert("deletions".into(), self.deletions.into());
        if let Some(diff) = &self.diff_content {
            meta.insert("diff_content".into(), diff.clone().into());
        }
    }

    /// Re-nest from metadata entries
    pub fn from_metadata(meta: &BTreeMap<String, serde_json::Value>) -> Option<Self> {
        Some(Self {
            commit_hash: meta.get("commit_hash")?.as_str()?.to_string(),
            author: meta
                .get("author")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            author_email: meta
                .get("author_email")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            commit_date_unix: meta.get("commit_date_unix")?.as_f64()?,
            files_changed: meta
                .get("files_changed")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32,
            insertions: meta.get("insertions").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
            deletions: meta.get("deletions").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
            diff_content: meta
                .get("diff_content")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })
    }
}

/// Retrieval mode for search operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Dense ANN search only
    #[default]
    Semantic,
    /// Sparse keyword scoring only
    Keyword,
    /// Fusion of both
    Hybrid,
}

impl SearchMode {
    /// Parse a mode string into the enum variant
    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "semantic" => Some(Self::Semantic),
            "keyword" => Some(Self::Keyword),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }
}

/// How dense and sparse scores are fused in hybrid mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FusionKind {
    /// `alpha * semantic + (1 - alpha) * keyword`
    #[default]
    Linear,
    /// Reciprocal-rank fusion with a configured `k`
    Rrf,
}

/// Per-result score breakdown surfaced to callers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct ScoreBreakdown {
    /// Cosine similarity from the ANN branch
    pub semantic: f32,
    /// Normalized keyword score from the sparse branch
    pub keyword: f32,
    /// Score after fusion, before adjustments
    pub fused: f32,
    /// Final score after lifecycle/importance/trust adjustments
    pub adjusted: f32,
}

/// Human-facing confidence bucket derived from the adjusted score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// adjusted score > 0.8
    Excellent,
    /// 0.6 to 0.8
    Good,
    /// 0.4 to 0.6
    Fair,
    /// below 0.4
    Poor,
}

impl Confidence {
    /// Bucket a score
    pub fn from_score(score: f32) -> Self {
        if score > 0.8 {
            Self::Excellent
        } else if score >= 0.6 {
            Self::Good
        } else if score >= 0.4 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

/// A ranked retrieval result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredMemory {
    /// The matched record
    pub record: MemoryRecord,
    /// Final relevance score in [0, 1]
    pub score: f32,
    /// Component scores for display
    pub scores: ScoreBreakdown,
    /// Confidence bucket of `score`
    pub confidence: Confidence,
}

/// Summary of a codebase indexing run
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct IndexReport {
    /// Files visited (indexed + unchanged + skipped)
    pub files_indexed: u32,
    /// Files skipped because their hash was unchanged
    pub files_unchanged: u32,
    /// Files skipped for unsupported language
    pub files_skipped: u32,
    /// Semantic units upserted
    pub units_indexed: u32,
    /// Embeddings computed (cache misses only)
    pub units_embedded: u32,
    /// Embedding cache hit rate over the run, in [0, 1]
    pub cache_hit_rate: f64,
    /// Wall-clock duration in seconds
    pub elapsed_s: f64,
    /// Per-file errors accumulated during the run
    pub errors: Vec<String>,
}

/// Summary of a documentation ingest run
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DocIngestReport {
    /// Markdown files processed
    pub files_processed: u32,
    /// Chunks upserted
    pub chunks: u32,
    /// Wall-clock duration in seconds
    pub elapsed_s: f64,
}

/// Summary of a git history indexing run
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GitIndexReport {
    /// Commits upserted
    pub commits_indexed: u32,
    /// Whether diff bodies were included
    pub diffs_included: bool,
    /// Wall-clock duration in seconds
    pub elapsed_s: f64,
}

/// Service status snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusReport {
    /// Configured storage backend name
    pub storage_backend: String,
    /// Whether mutating operations are rejected
    pub read_only_mode: bool,
    /// Total records in the collection
    pub memory_count: u64,
    /// Known collection names
    pub collections: Vec<String>,
    /// Seconds since the service was constructed
    pub uptime_s: u64,
}

/// Paged listing result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListPage {
    /// Records on this page
    pub results: Vec<MemoryRecord>,
    /// Exact total matching the filter; never 0 when `results` is non-empty
    pub total: u64,
    /// Whether another page exists past `offset + results.len()`
    pub has_more: bool,
}

/// Uniform response envelope for every public operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope<T> {
    /// `"success"` or `"error"`
    pub status: String,
    /// Present on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Present on error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
}

/// Error half of the envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvelopeError {
    /// Machine-readable kind tag
    pub kind: String,
    /// Human-readable message; injection candidates are redacted
    pub message: String,
}

impl<T> Envelope<T> {
    /// Wrap a successful result
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data: Some(data),
            error: None,
        }
    }

    /// Wrap an error
    pub fn failure(err: &crate::domain::error::Error) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(EnvelopeError {
                kind: err.kind_tag().to_string(),
                message: err.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_weights() {
        assert_eq!(LifecycleState::Active.search_weight(), 1.0);
        assert_eq!(LifecycleState::Recent.search_weight(), 0.7);
        assert_eq!(LifecycleState::Archived.search_weight(), 0.3);
        assert_eq!(LifecycleState::Stale.search_weight(), 0.1);
    }

    #[test]
    fn code_unit_metadata_round_trip() {
        let payload = CodeUnitPayload {
            file_path: "src/auth.py".into(),
            unit_type: UnitKind::Function,
            unit_name: "login".into(),
            start_line: 10,
            end_line: 20,
            signature: "def login(user, pw)".into(),
            language: "python".into(),
            file_hash: "ab".repeat(32),
        };
        let mut meta = BTreeMap::new();
        payload.write_metadata(&mut meta);
        assert_eq!(CodeUnitPayload::from_metadata(&meta), Some(payload));
    }

    #[test]
    fn commit_metadata_round_trip() {
        let payload = CommitPayload {
            commit_hash: "a1".repeat(20),
            author: "Dev".into(),
            author_email: "dev@example.com".into(),
            commit_date_unix: 1_704_067_200.0,
            files_changed: 3,
            insertions: 40,
            deletions: 5,
            diff_content: None,
        };
        let mut meta = BTreeMap::new();
        payload.write_metadata(&mut meta);
        assert_eq!(CommitPayload::from_metadata(&meta), Some(payload));
    }

    #[test]
    fn confidence_buckets() {
        assert_eq!(Confidence::from_score(0.9), Confidence::Excellent);
        assert_eq!(Confidence::from_score(0.7), Confidence::Good);
        assert_eq!(Confidence::from_score(0.5), Confidence::Fair);
        assert_eq!(Confidence::from_score(0.1), Confidence::Poor);
    }

    #[test]
    fn envelope_shapes() {
        let ok = Envelope::success(42u32);
        assert_eq!(ok.status, "success");
        assert_eq!(ok.data, Some(42));
        assert!(ok.error.is_none());

        let err = Envelope::<u32>::failure(&crate::domain::error::Error::not_found("abc"));
        assert_eq!(err.status, "error");
        assert!(err.data.is_none());
        assert_eq!(err.error.unwrap().kind, "not_found");
    }
}
