//! Pure input sanitization for all externally supplied strings and filters
//!
//! Everything here is synchronous and side-effect free: no I/O, no logging.
//! The facade decides what to log when a check fails. Failure messages never
//! echo injection candidates back; offending values are canonicalized to
//! `<redacted>`.

pub mod patterns;

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

use crate::domain::error::{Error, Result, ValidationKind};
use crate::domain::types::{
    ContextLevel, MemoryCategory, MemoryScope, SearchMode, UnitKind, CONTENT_MAX_BYTES, MAX_TAGS,
};

/// Placeholder substituted for rejected input in user-visible messages
pub const REDACTED: &str = "<redacted>";

/// Maximum length for short identifier-like fields (project names, tags,
/// languages, glob patterns)
pub const SHORT_FIELD_MAX: usize = 256;

/// Filter keys accepted by [`validate_filters`]; everything else is rejected
pub const ALLOWED_FILTER_KEYS: &[&str] = &[
    "category",
    "context_level",
    "scope",
    "project_name",
    "tags",
    "min_importance",
    "max_importance",
    "date_from",
    "date_to",
    "language",
    "file_pattern",
    "unit_type",
];

/// Typed, sanitized search filters
///
/// Produced only by [`validate_filters`]; the vector store translates these
/// into payload-index clauses without further checking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    /// Restrict to one category
    pub category: Option<MemoryCategory>,
    /// Restrict to one context level
    pub context_level: Option<ContextLevel>,
    /// Restrict to one scope
    pub scope: Option<MemoryScope>,
    /// Restrict to one project
    pub project_name: Option<String>,
    /// Require all of these tags
    pub tags: Vec<String>,
    /// Lower importance bound, inclusive
    pub min_importance: Option<f32>,
    /// Upper importance bound, inclusive
    pub max_importance: Option<f32>,
    /// Created-at lower bound
    pub date_from: Option<DateTime<Utc>>,
    /// Created-at upper bound
    pub date_to: Option<DateTime<Utc>>,
    /// Restrict code results to one language
    pub language: Option<String>,
    /// Glob over `file_path`
    pub file_pattern: Option<String>,
    /// Restrict code results to one unit kind
    pub unit_type: Option<UnitKind>,
}

impl SearchFilters {
    /// Whether no filter clause is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A sanitized store request, ready for the facade
#[derive(Debug, Clone, PartialEq)]
pub struct StoreRequest {
    /// Memory content
    pub content: String,
    /// Category
    pub category: MemoryCategory,
    /// Scope; `project_name` must be present for non-global scopes
    pub scope: MemoryScope,
    /// Owning project, if scoped
    pub project_name: Option<String>,
    /// Explicit context level; `None` means auto-classify
    pub context_level: Option<ContextLevel>,
    /// Relevance prior
    pub importance: f32,
    /// Tags
    pub tags: Vec<String>,
    /// Caller metadata (string → scalar)
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// A sanitized query request, ready for the retriever
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Natural-language query
    pub query: String,
    /// Result budget
    pub k: usize,
    /// Typed filters
    pub filters: SearchFilters,
    /// Retrieval mode
    pub mode: SearchMode,
    /// Drop results scoring below this
    pub min_score: Option<f32>,
}

/// Validate a free-form text field.
///
/// Rejects oversize input, null bytes and control characters (everything
/// below 0x20 except tab and newline, plus CR as part of CRLF), and any
/// match in the injection catalogue. Returns the input with trailing
/// whitespace stripped.
pub fn validate_text(s: &str, max_len: usize, field: &str) -> Result<String> {
    if s.is_empty() {
        return Err(Error::validation(
            ValidationKind::Size,
            field,
            "must not be empty",
        ));
    }
    if s.len() > max_len {
        return Err(Error::validation(
            ValidationKind::Size,
            field,
            format!("exceeds {max_len} bytes"),
        ));
    }
    if s.contains('\0') {
        return Err(Error::validation(
            ValidationKind::Charset,
            field,
            "contains null bytes",
        ));
    }
    if s.chars()
        .any(|c| c.is_control() && c != '\t' && c != '\n' && c != '\r')
    {
        return Err(Error::validation(
            ValidationKind::Charset,
            field,
            "contains control characters",
        ));
    }
    if let Some(class) = patterns::detect(s) {
        return Err(Error::validation(
            ValidationKind::Injection,
            field,
            format!("{class} injection pattern detected: {REDACTED}"),
        ));
    }
    Ok(s.trim_end().to_string())
}

/// Validate a short identifier-like field (project name, tag, language)
pub fn validate_short(s: &str, field: &str) -> Result<String> {
    validate_text(s, SHORT_FIELD_MAX, field)
}

fn expect_str<'a>(value: &'a serde_json::Value, key: &str) -> Result<&'a str> {
    value.as_str().ok_or_else(|| {
        Error::validation(ValidationKind::Type, key, "expected a string")
    })
}

fn expect_f64(value: &serde_json::Value, key: &str) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        Error::validation(ValidationKind::Type, key, "expected a number")
    })
}

/// Parse an ISO-8601 date or datetime into UTC.
///
/// Accepts `YYYY-MM-DD` (midnight UTC) and full RFC 3339 timestamps. The
/// vector store converts to Unix seconds on the wire.
pub fn parse_date(s: &str, field: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }
    Err(Error::validation(
        ValidationKind::Type,
        field,
        "expected an ISO-8601 date or datetime",
    ))
}

/// Validate a filter dictionary against the payload-index allowlist.
///
/// Unknown keys are rejected; values are coerced to their declared types or
/// rejected on mismatch. String values pass through [`validate_short`].
pub fn validate_filters(raw: &serde_json::Value) -> Result<SearchFilters> {
    let map = match raw {
        serde_json::Value::Null => return Ok(SearchFilters::default()),
        serde_json::Value::Object(map) => map,
        _ => {
            return Err(Error::validation(
                ValidationKind::Type,
                "filters",
                "expected an object",
            ))
        }
    };

    let mut filters = SearchFilters::default();
    for (key, value) in map {
        if !ALLOWED_FILTER_KEYS.contains(&key.as_str()) {
            return Err(Error::validation(
                ValidationKind::Field,
                key.clone(),
                "unknown filter key",
            ));
        }
        match key.as_str() {
            "category" => {
                let s = expect_str(value, key)?;
                filters.category = Some(MemoryCategory::from_string(s).ok_or_else(|| {
                    Error::validation(ValidationKind::Type, key.clone(), "unknown category")
                })?);
            }
            "context_level" => {
                let s = expect_str(value, key)?;
                filters.context_level = Some(ContextLevel::from_string(s).ok_or_else(|| {
                    Error::validation(ValidationKind::Type, key.clone(), "unknown context level")
                })?);
            }
            "scope" => {
                let s = expect_str(value, key)?;
                filters.scope = Some(MemoryScope::from_string(s).ok_or_else(|| {
                    Error::validation(ValidationKind::Type, key.clone(), "unknown scope")
                })?);
            }
            "project_name" => {
                filters.project_name = Some(validate_short(expect_str(value, key)?, key)?);
            }
            "tags" => {
                let arr = value.as_array().ok_or_else(|| {
                    Error::validation(ValidationKind::Type, key.clone(), "expected an array")
                })?;
                if arr.len() > MAX_TAGS {
                    return Err(Error::validation(
                        ValidationKind::Size,
                        key.clone(),
                        format!("more than {MAX_TAGS} tags"),
                    ));
                }
                for tag in arr {
                    filters.tags.push(validate_short(expect_str(tag, key)?, key)?);
                }
            }
            "min_importance" | "max_importance" => {
                let v = expect_f64(value, key)?;
                if !(0.0..=1.0).contains(&v) {
                    return Err(Error::validation(
                        ValidationKind::Type,
                        key.clone(),
                        "importance must be in [0, 1]",
                    ));
                }
                if key == "min_importance" {
                    filters.min_importance = Some(v as f32);
                } else {
                    filters.max_importance = Some(v as f32);
                }
            }
            "date_from" => filters.date_from = Some(parse_date(expect_str(value, key)?, key)?),
            "date_to" => filters.date_to = Some(parse_date(expect_str(value, key)?, key)?),
            "language" => filters.language = Some(validate_short(expect_str(value, key)?, key)?),
            "file_pattern" => {
                let s = validate_short(expect_str(value, key)?, key)?;
                glob::Pattern::new(&s).map_err(|_| {
                    Error::validation(ValidationKind::Type, key.clone(), "invalid glob pattern")
                })?;
                filters.file_pattern = Some(s);
            }
            "unit_type" => {
                let s = expect_str(value, key)?;
                filters.unit_type = Some(UnitKind::from_string(s).ok_or_else(|| {
                    Error::validation(ValidationKind::Type, key.clone(), "unknown unit type")
                })?);
            }
            _ => unreachable!("key checked against allowlist"),
        }
    }
    Ok(filters)
}

/// Compose a full store request from raw inputs
#[allow(clippy::too_many_arguments)]
pub fn validate_store_request(
    content: &str,
    category: &str,
    scope: &str,
    project_name: Option<&str>,
    context_level: Option<&str>,
    importance: f32,
    tags: &[String],
    metadata: Option<&serde_json::Value>,
) -> Result<StoreRequest> {
    let content = validate_text(content, CONTENT_MAX_BYTES, "content")?;
    let category = MemoryCategory::from_string(category).ok_or_else(|| {
        Error::validation(ValidationKind::Type, "category", "unknown category")
    })?;
    let scope = MemoryScope::from_string(scope)
        .ok_or_else(|| Error::validation(ValidationKind::Type, "scope", "unknown scope"))?;

    let project_name = match project_name {
        Some(name) => Some(validate_short(name, "project_name")?),
        None => None,
    };
    if scope != MemoryScope::Global && project_name.is_none() {
        return Err(Error::validation(
            ValidationKind::Field,
            "project_name",
            format!("required for scope `{scope}`"),
        ));
    }

    let context_level = match context_level {
        None | Some("auto") => None,
        Some(s) => Some(ContextLevel::from_string(s).ok_or_else(|| {
            Error::validation(ValidationKind::Type, "context_level", "unknown context level")
        })?),
    };

    if !(0.0..=1.0).contains(&importance) {
        return Err(Error::validation(
            ValidationKind::Type,
            "importance",
            "must be in [0, 1]",
        ));
    }

    if tags.len() > MAX_TAGS {
        return Err(Error::validation(
            ValidationKind::Size,
            "tags",
            format!("more than {MAX_TAGS} tags"),
        ));
    }
    let tags = tags
        .iter()
        .map(|t| validate_short(t, "tags"))
        .collect::<Result<Vec<_>>>()?;

    let metadata = match metadata {
        None | Some(serde_json::Value::Null) => BTreeMap::new(),
        Some(serde_json::Value::Object(map)) => {
            let mut out = BTreeMap::new();
            for (key, value) in map {
                validate_short(key, "metadata")?;
                match value {
                    serde_json::Value::String(s) => {
                        out.insert(
                            key.clone(),
                            validate_text(s, SHORT_FIELD_MAX * 4, "metadata")?.into(),
                        );
                    }
                    serde_json::Value::Number(_) | serde_json::Value::Bool(_) => {
                        out.insert(key.clone(), value.clone());
                    }
                    _ => {
                        return Err(Error::validation(
                            ValidationKind::Type,
                            "metadata",
                            format!("`{key}` must be a scalar"),
                        ))
                    }
                }
            }
            out
        }
        Some(_) => {
            return Err(Error::validation(
                ValidationKind::Type,
                "metadata",
                "expected an object",
            ))
        }
    };

    Ok(StoreRequest {
        content,
        category,
        scope,
        project_name,
        context_level,
        importance,
        tags,
        metadata,
    })
}

/// Compose a full query request from raw inputs
pub fn validate_query_request(
    query: &str,
    k: usize,
    filters: Option<&serde_json::Value>,
    mode: &str,
    min_score: Option<f32>,
) -> Result<QueryRequest> {
    let query = validate_text(query, 4096, "query")?;
    if k == 0 || k > 100 {
        return Err(Error::validation(
            ValidationKind::Size,
            "k",
            "must be between 1 and 100",
        ));
    }
    let filters = match filters {
        Some(raw) => validate_filters(raw)?,
        None => SearchFilters::default(),
    };
    let mode = SearchMode::from_string(mode)
        .ok_or_else(|| Error::validation(ValidationKind::Type, "mode", "unknown search mode"))?;
    if let Some(score) = min_score {
        if !(0.0..=1.0).contains(&score) {
            return Err(Error::validation(
                ValidationKind::Type,
                "min_score",
                "must be in [0, 1]",
            ));
        }
    }
    Ok(QueryRequest {
        query,
        k,
        filters,
        mode,
        min_score,
    })
}
