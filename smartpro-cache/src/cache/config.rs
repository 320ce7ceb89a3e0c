//! Per-call options for cache writes and reads

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options accepted by [`CacheManager`](crate::cache::CacheManager) operations
///
/// When both expirations are set, `expiration_seconds` wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOptions {
    /// Time-to-live in seconds
    pub expiration_seconds: Option<u64>,

    /// Time-to-live in minutes, used when `expiration_seconds` is absent
    pub expiration_minutes: Option<u64>,

    /// Fall back to local storage when the backend is unavailable
    pub use_local_fallback: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            expiration_seconds: None,
            expiration_minutes: None,
            use_local_fallback: true,
        }
    }
}

impl CacheOptions {
    /// Create a new builder for cache options
    pub fn builder() -> CacheOptionsBuilder {
        CacheOptionsBuilder::default()
    }

    /// Options with a TTL expressed as a `Duration` (rounded down to whole seconds)
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            expiration_seconds: Some(ttl.as_secs()),
            ..Default::default()
        }
    }

    /// Options with a TTL in seconds
    pub fn seconds(secs: u64) -> Self {
        Self {
            expiration_seconds: Some(secs),
            ..Default::default()
        }
    }

    /// Options with a TTL in minutes
    pub fn minutes(mins: u64) -> Self {
        Self {
            expiration_minutes: Some(mins),
            ..Default::default()
        }
    }

    /// Effective time-to-live, if any
    pub fn effective_ttl(&self) -> Option<Duration> {
        self.expiration_seconds
            .or_else(|| self.expiration_minutes.map(|m| m.saturating_mul(60)))
            .map(Duration::from_secs)
    }
}

/// Builder for cache options
#[derive(Debug, Default)]
pub struct CacheOptionsBuilder {
    expiration_seconds: Option<u64>,
    expiration_minutes: Option<u64>,
    use_local_fallback: Option<bool>,
}

impl CacheOptionsBuilder {
    pub fn expiration_seconds(mut self, secs: u64) -> Self {
        self.expiration_seconds = Some(secs);
        self
    }

    pub fn expiration_minutes(mut self, mins: u64) -> Self {
        self.expiration_minutes = Some(mins);
        self
    }

    /// Enable or disable the local storage fallback
    pub fn use_local_fallback(mut self, enable: bool) -> Self {
        self.use_local_fallback = Some(enable);
        self
    }

    pub fn build(self) -> CacheOptions {
        let defaults = CacheOptions::default();

        CacheOptions {
            expiration_seconds: self.expiration_seconds,
            expiration_minutes: self.expiration_minutes,
            use_local_fallback: self
                .use_local_fallback
                .unwrap_or(defaults.use_local_fallback),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = CacheOptions::default();
        assert!(options.use_local_fallback);
        assert_eq!(options.effective_ttl(), None);
    }

    #[test]
    fn test_seconds_take_precedence_over_minutes() {
        let options = CacheOptions::builder()
            .expiration_seconds(30)
            .expiration_minutes(10)
            .build();

        assert_eq!(options.effective_ttl(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_minutes_convert_to_seconds() {
        assert_eq!(
            CacheOptions::minutes(15).effective_ttl(),
            Some(Duration::from_secs(900))
        );
    }

    #[test]
    fn test_builder_disables_fallback() {
        let options = CacheOptions::builder().use_local_fallback(false).build();
        assert!(!options.use_local_fallback);
    }
}
