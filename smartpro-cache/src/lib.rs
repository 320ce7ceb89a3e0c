//! # SmartPRO cache (smartpro-cache)
//!
//! Caching layer for the SmartPRO application with graceful degradation.
//!
//! ## Features
//!
//! - Remote key-value cache over a REST endpoint, lazily connected
//! - Liveness probe (`PING`) before every cache operation
//! - Local storage fallback with self-expiring JSON envelopes
//! - Every failure logged and converted to a safe default; nothing panics
//!   or propagates into callers
//! - Injected clock for deterministic expiry in tests
//!
//! ## Remote adapter
//!
//! ```no_run
//! use smartpro_cache::{RemoteCache, RemoteCacheConfig};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let remote = RemoteCache::new(RemoteCacheConfig::new("https://kv.example.com", "token"));
//!
//! if remote.is_available().await {
//!     remote.set("visits", &0, Some(Duration::from_secs(60))).await;
//!     let visits = remote.incr("visits").await;
//!     println!("Visits: {}", visits);
//! }
//! # }
//! ```
//!
//! ## Cache abstraction
//!
//! ```no_run
//! use smartpro_cache::{CacheManager, CacheOptions, FileStorage, RemoteBackend, RemoteCache};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let remote = Arc::new(RemoteCache::from_env());
//! let local = Arc::new(FileStorage::open_default()?);
//! let cache = CacheManager::new(Arc::new(RemoteBackend::new(remote)), Some(local));
//!
//! cache.set("greeting", "hello", CacheOptions::seconds(30)).await;
//! assert_eq!(cache.get::<String>("greeting").await.as_deref(), Some("hello"));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod error;
pub mod remote;

// Re-export main types for convenience
pub use cache::{
    Backend, CacheLayer, CacheManager, CacheManagerBuilder, CacheOptions, CacheOptionsBuilder,
    CacheStats, CachedValue, FileStorage, InMemoryBackend, LocalStorage, MemoryStorage,
    NullBackend, RemoteBackend,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CacheError, Result};
pub use remote::{RemoteCache, RemoteCacheConfig, RestClient};
