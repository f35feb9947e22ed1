//! Error handling types
//!
//! A single error enum covers the whole service. Each variant carries the
//! failing field or resource where one exists, and [`Error::is_transient`]
//! drives the retry policy: only transient storage/network failures are ever
//! retried, everything else surfaces to the caller on the first attempt.

use thiserror::Error;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    /// Input exceeds a size limit
    Size,
    /// Input contains forbidden characters (null bytes, control characters)
    Charset,
    /// Input matched an injection pattern
    Injection,
    /// Unknown or disallowed field/filter key
    Field,
    /// Value has the wrong type for its field
    Type,
}

impl std::fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Size => write!(f, "size"),
            Self::Charset => write!(f, "charset"),
            Self::Injection => write!(f, "injection"),
            Self::Field => write!(f, "field"),
            Self::Type => write!(f, "type"),
        }
    }
}

/// Classification of a parse failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// No grammar registered for the file's language
    UnsupportedLanguage,
    /// The source did not parse cleanly
    MalformedSyntax,
    /// The file contained nothing to extract
    EmptyFile,
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLanguage => write!(f, "unsupported_language"),
            Self::MalformedSyntax => write!(f, "malformed_syntax"),
            Self::EmptyFile => write!(f, "empty_file"),
        }
    }
}

/// Classification of a storage failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// The requested record does not exist
    NotFound,
    /// Unique-key violation
    Conflict,
    /// Network blip, timeout, backend 5xx; safe to retry
    Transient,
    /// Non-transient backend error (auth, 4xx)
    Backend,
    /// Collection/payload schema mismatch
    Schema,
}

impl std::fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Transient => write!(f, "transient"),
            Self::Backend => write!(f, "backend"),
            Self::Schema => write!(f, "schema"),
        }
    }
}

/// Main error type for the memory service
#[derive(Error, Debug)]
pub enum Error {
    /// Input failed validation; never retried
    #[error("validation failed ({kind}) on `{field}`: {detail}")]
    Validation {
        /// What class of check failed
        kind: ValidationKind,
        /// The offending field
        field: String,
        /// Human-readable detail; injection candidates are redacted
        detail: String,
    },

    /// Injection detected or another security rule violated; logged and surfaced
    #[error("security violation during `{op}`: {detail}")]
    Security {
        /// The operation that was rejected
        op: String,
        /// What was violated
        detail: String,
    },

    /// A mutating operation was attempted while read-only mode is active
    #[error("read-only mode: `{op}` rejected")]
    ReadOnly {
        /// The rejected operation
        op: String,
    },

    /// The requested record/collection does not exist
    #[error("not found: {resource}")]
    NotFound {
        /// The resource that was not found
        resource: String,
    },

    /// Unique-key violation; should only arise from schema bugs
    #[error("conflict: {detail}")]
    Conflict {
        /// Description of the conflicting state
        detail: String,
    },

    /// Transient I/O failure; retried with backoff, surfaced with the
    /// attempt count once the retry budget is exhausted
    #[error("transient failure after {attempts} attempt(s): {detail}")]
    Transient {
        /// How many attempts were made
        attempts: u32,
        /// Underlying failure description
        detail: String,
    },

    /// Source file could not be parsed
    #[error("parse failure ({kind}) in {path}: {detail}")]
    Parse {
        /// What went wrong
        kind: ParseErrorKind,
        /// The file being parsed
        path: String,
        /// Detail message
        detail: String,
    },

    /// The embedding model failed on a batch
    #[error("embedding failure: {detail}")]
    Embedding {
        /// Detail message
        detail: String,
        /// Indices of the inputs in the failed batch
        batch_indices: Vec<usize>,
    },

    /// Non-transient vector store failure
    #[error("storage failure ({kind}): {detail}")]
    Storage {
        /// What class of storage failure
        kind: StorageErrorKind,
        /// Detail message
        detail: String,
    },

    /// The connection pool had no free slot within the acquire timeout
    #[error("connection pool exhausted after {waited_ms} ms")]
    PoolExhausted {
        /// How long the caller waited
        waited_ms: u64,
    },

    /// A pooled connection failed its health check
    #[error("connection unhealthy: {detail}")]
    ConnectionHealth {
        /// Detail message
        detail: String,
    },

    /// A new backend client could not be created
    #[error("connection creation failed: {detail}")]
    ConnectionCreation {
        /// Detail message
        detail: String,
    },

    /// An external RPC exceeded its deadline
    #[error("operation timed out after {elapsed_ms} ms")]
    Timeout {
        /// Elapsed time before the deadline fired
        elapsed_ms: u64,
    },

    /// Embedding cache failure; advisory, callers may treat as a miss
    #[error("cache error: {detail}")]
    Cache {
        /// Detail message
        detail: String,
    },

    /// Invalid configuration at startup; fatal for the process
    #[error("configuration error: {detail}")]
    Config {
        /// Detail message
        detail: String,
    },

    /// I/O operation error
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// JSON parsing or serialization error
    #[error("JSON error: {source}")]
    Json {
        /// The underlying JSON error
        #[from]
        source: serde_json::Error,
    },

    /// Internal invariant violation
    #[error("internal error: {detail}")]
    Internal {
        /// Detail message
        detail: String,
    },
}

impl Error {
    /// Create a validation error
    pub fn validation<F, D>(kind: ValidationKind, field: F, detail: D) -> Self
    where
        F: Into<String>,
        D: Into<String>,
    {
        Self::Validation {
            kind,
            field: field.into(),
            detail: detail.into(),
        }
    }

    /// Create a security error
    pub fn security<O: Into<String>, D: Into<String>>(op: O, detail: D) -> Self {
        Self::Security {
            op: op.into(),
            detail: detail.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a transient error for a single failed attempt
    pub fn transient<S: Into<String>>(detail: S) -> Self {
        Self::Transient {
            attempts: 1,
            detail: detail.into(),
        }
    }

    /// Create a storage error
    pub fn storage<S: Into<String>>(kind: StorageErrorKind, detail: S) -> Self {
        Self::Storage {
            kind,
            detail: detail.into(),
        }
    }

    /// Create an embedding error covering the given batch
    pub fn embedding<S: Into<String>>(detail: S, batch_indices: Vec<usize>) -> Self {
        Self::Embedding {
            detail: detail.into(),
            batch_indices,
        }
    }

    /// Create a parse error
    pub fn parse<P: Into<String>, D: Into<String>>(
        kind: ParseErrorKind,
        path: P,
        detail: D,
    ) -> Self {
        Self::Parse {
            kind,
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Create a cache error
    pub fn cache<S: Into<String>>(detail: S) -> Self {
        Self::Cache {
            detail: detail.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(detail: S) -> Self {
        Self::Config {
            detail: detail.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(detail: S) -> Self {
        Self::Internal {
            detail: detail.into(),
        }
    }

    /// Whether the retry policy may re-attempt the failed operation.
    ///
    /// Retryable: transient storage/network failures, pool exhaustion,
    /// connection creation failures, timeouts. Everything else surfaces
    /// immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transient { .. }
                | Self::Storage {
                    kind: StorageErrorKind::Transient,
                    ..
                }
                | Self::PoolExhausted { .. }
                | Self::ConnectionCreation { .. }
                | Self::Timeout { .. }
        )
    }

    /// Whether this error must be recorded in the security log
    pub fn is_security(&self) -> bool {
        matches!(
            self,
            Self::Security { .. }
                | Self::ReadOnly { .. }
                | Self::Validation {
                    kind: ValidationKind::Injection,
                    ..
                }
        )
    }

    /// Short machine-readable kind tag used in envelopes and the security log
    pub fn kind_tag(&self) -> &'static str {
        match self {
            Self::Validation {
                kind: ValidationKind::Injection,
                ..
            } => "injection",
            Self::Validation { .. } => "validation",
            Self::Security { .. } => "security",
            Self::ReadOnly { .. } => "read_only",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Transient { .. } => "transient",
            Self::Parse { .. } => "parse",
            Self::Embedding { .. } => "embedding",
            Self::Storage { .. } => "storage",
            Self::PoolExhausted { .. } => "pool_exhausted",
            Self::ConnectionHealth { .. } => "connection_health",
            Self::ConnectionCreation { .. } => "connection_creation",
            Self::Timeout { .. } => "timeout",
            Self::Cache { .. } => "cache",
            Self::Config { .. } => "config",
            Self::Io { .. } => "io",
            Self::Json { .. } => "json",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config {
            detail: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        // Connect failures, timeouts and 5xx responses are worth retrying;
        // everything else (body decode, 4xx) is a hard backend error.
        if err.is_timeout() || err.is_connect() {
            return Self::Storage {
                kind: StorageErrorKind::Transient,
                detail: err.to_string(),
            };
        }
        if let Some(status) = err.status() {
            if status.is_server_error() {
                return Self::Storage {
                    kind: StorageErrorKind::Transient,
                    detail: err.to_string(),
                };
            }
        }
        Self::Storage {
            kind: StorageErrorKind::Backend,
            detail: err.to_string(),
        }
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Self::Cache {
            detail: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::transient("blip").is_transient());
        assert!(Error::PoolExhausted { waited_ms: 10 }.is_transient());
        assert!(Error::Timeout { elapsed_ms: 30_000 }.is_transient());
        assert!(Error::storage(StorageErrorKind::Transient, "503").is_transient());

        assert!(!Error::storage(StorageErrorKind::Backend, "401").is_transient());
        assert!(!Error::not_found("id").is_transient());
        assert!(!Error::validation(ValidationKind::Size, "content", "too long").is_transient());
        assert!(!Error::ReadOnly { op: "store".into() }.is_transient());
    }

    #[test]
    fn security_classification() {
        assert!(
            Error::validation(ValidationKind::Injection, "content", "<redacted>").is_security()
        );
        assert!(Error::ReadOnly { op: "delete".into() }.is_security());
        assert!(!Error::validation(ValidationKind::Size, "content", "too long").is_security());
        assert!(!Error::transient("blip").is_security());
    }

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(
            Error::validation(ValidationKind::Injection, "content", "x").kind_tag(),
            "injection"
        );
        assert_eq!(
            Error::ReadOnly { op: "store".into() }.kind_tag(),
            "read_only"
        );
        assert_eq!(Error::not_found("x").kind_tag(), "not_found");
    }
}
