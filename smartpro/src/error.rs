//! Error types for the session and role layers

use smartpro_cache::CacheError;
use thiserror::Error;

/// Failures reported by the authentication service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// There is no session to read or refresh
    #[error("no active session")]
    NoSession,

    #[error("session expired")]
    SessionExpired,

    #[error("network error: {0}")]
    Network(String),

    #[error("auth request timed out")]
    Timeout,

    /// Anything else the service rejected
    #[error("auth service error: {0}")]
    Service(String),
}

/// Failures reported by the profile store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("network error: {0}")]
    Network(String),

    #[error("profile query timed out")]
    Timeout,

    #[error("profile query failed: {0}")]
    Query(String),
}

/// Errors that can be retried by a [`RetryPolicy`](crate::retry::RetryPolicy)
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for AuthError {
    fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Network(_) | AuthError::Timeout)
    }
}

impl Retryable for ProfileError {
    fn is_retryable(&self) -> bool {
        matches!(self, ProfileError::Network(_) | ProfileError::Timeout)
    }
}

/// Crate-level error for configuration and wiring
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_classification() {
        assert!(AuthError::Network("reset".into()).is_retryable());
        assert!(AuthError::Timeout.is_retryable());
        assert!(!AuthError::NoSession.is_retryable());
        assert!(!AuthError::SessionExpired.is_retryable());
        assert!(!AuthError::Service("invalid grant".into()).is_retryable());
    }

    #[test]
    fn test_profile_error_classification() {
        assert!(ProfileError::Timeout.is_retryable());
        assert!(ProfileError::Network("dns".into()).is_retryable());
        // A message mentioning "network" is still a query failure
        assert!(!ProfileError::Query("network policy denied".into()).is_retryable());
    }

    #[test]
    fn test_cache_error_converts() {
        let err: Error = CacheError::NotConfigured.into();
        assert!(matches!(err, Error::Cache(_)));
    }
}
