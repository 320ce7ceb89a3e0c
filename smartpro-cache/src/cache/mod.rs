//! # Cache abstraction
//!
//! A key/value cache that prefers a configured [`Backend`] (normally the
//! hosted REST service) and transparently falls back to [`LocalStorage`]
//! when the backend is unreachable.
//!
//! ## Features
//!
//! - **TTL-Based Expiration**: per-call TTL in seconds or minutes
//! - **Fallback Chain**: backend first, then local storage, then a logged no-op
//! - **Self-Expiring Envelopes**: local entries carry `{value, expires}` and are
//!   dropped when read after expiry
//! - **Prefix Sweeps**: scan-and-delete on the backend, key walk on local storage
//!
//! ## Example
//!
//! ```rust
//! use smartpro_cache::cache::{CacheManager, CacheOptions, MemoryStorage, NullBackend};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let cache = CacheManager::new(Arc::new(NullBackend), Some(Arc::new(MemoryStorage::new())));
//!
//! cache.set("user_role_42", "provider", CacheOptions::minutes(15)).await;
//!
//! if let Some(role) = cache.get::<String>("user_role_42").await {
//!     println!("Cache hit: {}", role);
//! }
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod entry;
pub mod local;
pub mod manager;
pub mod types;

pub use backend::{Backend, InMemoryBackend, NullBackend, RemoteBackend};
pub use config::{CacheOptions, CacheOptionsBuilder};
pub use entry::CachedValue;
pub use local::{FileStorage, LocalStorage, MemoryStorage};
pub use manager::{CacheManager, CacheManagerBuilder};
pub use types::{CacheLayer, CacheStats};
