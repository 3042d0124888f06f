//! Error types for layered cache operations
//!
//! Two families live here. `StorageError` describes failures of a backing
//! key-value store; tiers catch it at their boundary and degrade to a miss or
//! a no-op write. `CacheError` is what callers of the orchestrator see, and
//! for `cached_query` that is only ever a genuine fetch failure or a value
//! that cannot round-trip through the tier representation.

use std::sync::Arc;
use thiserror::Error;

/// A fetch failure shared by every waiter of one in-flight query
pub type SharedError = Arc<anyhow::Error>;

/// Failure of a backing key-value store
#[derive(Error, Debug)]
pub enum StorageError {
    /// The store refused a write that would exceed its byte quota
    #[error("Storage quota exceeded: {requested} bytes requested, limit is {limit} bytes")]
    QuotaExceeded { limit: usize, requested: usize },

    /// The store is disabled or otherwise not usable
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Filesystem error from a file-backed store
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted data could not be encoded or decoded
    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// The query function failed; the same error is delivered to every waiter
    #[error("Query failed: {0}")]
    Fetch(SharedError),

    /// A fetched or cached value could not be converted to the requested type
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid cache configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backing store failure surfaced by an explicit maintenance operation
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CacheError {
    /// The shared fetch error, if this is a fetch failure
    pub fn fetch_error(&self) -> Option<&SharedError> {
        match self {
            CacheError::Fetch(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
