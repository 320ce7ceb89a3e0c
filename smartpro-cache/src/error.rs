//! Error types for cache operations
//!
//! Public cache operations never return these to callers: they are produced
//! inside the backends and converted to `false`/`None` at the boundary. They
//! exist so the internal plumbing can use `?` and so failures are logged with
//! a meaningful category.

use thiserror::Error;

/// Main error type for cache backends
#[derive(Error, Debug)]
pub enum CacheError {
    /// No credentials were found for the remote key-value service
    #[error("Remote cache is not configured")]
    NotConfigured,

    /// Transport-level failure talking to the REST endpoint
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with an `{"error": ...}` body
    #[error("Remote cache error: {0}")]
    Remote(String),

    /// The service answered with a shape we did not expect for the command
    #[error("Unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: String, reply: String },

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local storage could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),
}

impl CacheError {
    /// Whether the failure came from the network rather than from the data
    pub fn is_transient(&self) -> bool {
        match self {
            CacheError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError::Storage(e.to_string())
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
