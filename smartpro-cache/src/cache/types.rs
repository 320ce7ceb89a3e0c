//! Core type definitions for the cache system

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a cache operation was served from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheLayer {
    /// The configured backend (normally the hosted REST service)
    Backend,

    /// Local persistent storage
    Local,
}

impl fmt::Display for CacheLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheLayer::Backend => write!(f, "backend"),
            CacheLayer::Local => write!(f, "local"),
        }
    }
}

/// Statistics for cache monitoring
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads answered by the backend
    pub backend_hits: u64,

    /// Reads answered by local storage
    pub local_hits: u64,

    /// Reads that found nothing
    pub misses: u64,

    /// Operations that had to use local storage because the backend was down
    pub fallbacks: u64,

    /// Local entries dropped because they were read after expiry
    pub evictions_ttl: u64,

    /// Operations that could not be served at all
    pub failures: u64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.backend_hits + self.local_hits
    }

    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits() as f64 / total as f64) * 100.0
        }
    }

    pub(crate) fn record_hit(&mut self, layer: CacheLayer) {
        match layer {
            CacheLayer::Backend => self.backend_hits += 1,
            CacheLayer::Local => self.local_hits += 1,
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {} (backend {}, local {}), misses: {}, hit_rate: {:.2}%, fallbacks: {}, failures: {} }}",
            self.hits(),
            self.backend_hits,
            self.local_hits,
            self.misses,
            self.hit_rate(),
            self.fallbacks,
            self.failures
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            backend_hits: 60,
            local_hits: 20,
            misses: 20,
            ..Default::default()
        };

        assert_eq!(stats.hits(), 80);
        assert_eq!(stats.hit_rate(), 80.0);
    }

    #[test]
    fn test_cache_stats_zero_requests() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_cache_stats_display() {
        let mut stats = CacheStats::default();
        stats.record_hit(CacheLayer::Local);
        stats.misses = 1;

        let display = format!("{}", stats);
        assert!(display.contains("local 1"));
        assert!(display.contains("misses: 1"));
    }

    #[test]
    fn test_cache_layer_display() {
        assert_eq!(format!("{}", CacheLayer::Backend), "backend");
        assert_eq!(format!("{}", CacheLayer::Local), "local");
    }
}
