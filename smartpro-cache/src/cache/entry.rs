//! The `{value, expires}` envelope stored in local storage

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A cached value with an optional absolute expiry
///
/// Local storage has no native TTL, so the expiry travels with the value.
/// `expires` is milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedValue<T> {
    pub value: T,

    #[serde(default)]
    pub expires: Option<i64>,
}

impl<T> CachedValue<T> {
    /// Wrap a value, computing the expiry from `now_millis` and `ttl`
    pub fn new(value: T, now_millis: i64, ttl: Option<Duration>) -> Self {
        let expires = ttl.map(|ttl| {
            let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            now_millis.saturating_add(ttl_ms)
        });

        Self { value, expires }
    }

    /// Wrap a value that never expires
    pub fn persistent(value: T) -> Self {
        Self {
            value,
            expires: None,
        }
    }

    /// Check if the entry has expired at `now_millis`
    pub fn is_expired(&self, now_millis: i64) -> bool {
        matches!(self.expires, Some(expires) if expires <= now_millis)
    }

    /// Get time until expiration, `None` for persistent or already-expired entries
    pub fn time_until_expiration(&self, now_millis: i64) -> Option<Duration> {
        let expires = self.expires?;
        if expires <= now_millis {
            None
        } else {
            Some(Duration::from_millis((expires - now_millis) as u64))
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }
}
