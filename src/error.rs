//! Error types for graphcache
//!
//! Defines a single error enum covering normalization, resolution, transport and
//! persistence failures. Uses thiserror for ergonomic error handling.

use std::sync::Arc;
use thiserror::Error;

/// Result type alias for graphcache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Comprehensive error type for graphcache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// A leaf field requested by a query was never ingested
    #[error("Some of the leaf data requested in the query is not in the cache: {field}")]
    CacheMiss { field: String },

    /// The type resolver has no declared type for a relation field
    #[error("Unknown field type: {0}")]
    UnknownField(String),

    /// A response object is missing its discriminator or identifier
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Query execution failed
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Snapshot/database errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Network errors (non-success status, missing payload)
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with GraphQL errors
    #[error("GraphQL error: {0}")]
    GraphQL(String),

    /// Error shared between coalesced callers of one request
    #[error(transparent)]
    Shared(#[from] Arc<CacheError>),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Anyhow errors (for more context)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

impl CacheError {
    /// Build a cache miss for a field
    pub fn miss(field: impl Into<String>) -> Self {
        CacheError::CacheMiss {
            field: field.into(),
        }
    }

    /// Strip any sharing wrappers and return the underlying error
    pub fn root(&self) -> &CacheError {
        match self {
            CacheError::Shared(inner) => inner.root(),
            other => other,
        }
    }

    /// Whether this error (or the one it wraps) is a cache miss
    pub fn is_cache_miss(&self) -> bool {
        matches!(self.root(), CacheError::CacheMiss { .. })
    }
}
