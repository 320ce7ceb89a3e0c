//! Cache abstraction with backend-first, local-storage-fallback semantics

use crate::cache::{
    backend::{Backend, NullBackend},
    config::CacheOptions,
    entry::CachedValue,
    local::LocalStorage,
    types::{CacheLayer, CacheStats},
};
use crate::clock::{Clock, SystemClock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Key/value cache that prefers the configured backend and falls back to
/// local storage when the backend is unreachable
///
/// Backend availability is probed on every call; the probe result is never
/// cached. No operation returns an error: failures are logged and reported
/// as `false`/`None`.
///
/// Cloning is cheap and clones share state.
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn Backend>,
    local: Option<Arc<dyn LocalStorage>>,
    clock: Arc<dyn Clock>,
    stats: Mutex<CacheStats>,
}

/// Where an operation should be routed after the availability probe
enum Route<'a> {
    Backend,
    Local(&'a dyn LocalStorage),
    Nowhere,
}

impl CacheManager {
    /// Create a manager over a backend and optional local storage
    pub fn new(backend: Arc<dyn Backend>, local: Option<Arc<dyn LocalStorage>>) -> Self {
        Self::builder().backend(backend).local_storage_opt(local).build()
    }

    pub fn builder() -> CacheManagerBuilder {
        CacheManagerBuilder::default()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.inner.clock)
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.backend.name()
    }

    pub fn has_local_storage(&self) -> bool {
        self.inner.local.is_some()
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.stats.lock().await.clone()
    }

    /// Store a value
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, options: CacheOptions) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, "Failed to serialize cache value: {}", e);
                return false;
            }
        };
        let ttl = options.effective_ttl();

        match self.route(options).await {
            Route::Backend => self.inner.backend.set(key, &value, ttl).await,
            Route::Local(local) => {
                let entry = CachedValue::new(value, self.inner.clock.now_millis(), ttl);
                let stored = serde_json::to_string(&entry)
                    .map_err(Into::into)
                    .and_then(|text| local.set_item(key, &text));

                match stored {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(key = %key, "Failed to write local cache entry: {}", e);
                        false
                    }
                }
            }
            Route::Nowhere => false,
        }
    }

    /// Fetch a value with default options
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_with(key, CacheOptions::default()).await
    }

    /// Fetch a value
    pub async fn get_with<T: DeserializeOwned>(&self, key: &str, options: CacheOptions) -> Option<T> {
        let (layer, value) = match self.route(options).await {
            Route::Backend => (CacheLayer::Backend, self.inner.backend.get(key).await),
            Route::Local(local) => (CacheLayer::Local, self.read_local(local, key).await),
            Route::Nowhere => return None,
        };

        let Some(value) = value else {
            debug!(key = %key, layer = %layer, "Cache miss");
            self.inner.stats.lock().await.misses += 1;
            return None;
        };

        match serde_json::from_value(value) {
            Ok(decoded) => {
                debug!(key = %key, layer = %layer, "Cache hit");
                self.inner.stats.lock().await.record_hit(layer);
                Some(decoded)
            }
            Err(e) => {
                warn!(key = %key, "Cached value has an unexpected shape: {}", e);
                self.inner.stats.lock().await.misses += 1;
                None
            }
        }
    }

    /// Remove a key; removing a missing key succeeds
    pub async fn delete(&self, key: &str) -> bool {
        match self.route(CacheOptions::default()).await {
            Route::Backend => self.inner.backend.delete(key).await,
            Route::Local(local) => match local.remove_item(key) {
                Ok(()) => true,
                Err(e) => {
                    warn!(key = %key, "Failed to remove local cache entry: {}", e);
                    false
                }
            },
            Route::Nowhere => false,
        }
    }

    /// Whether a live (non-expired) entry exists
    pub async fn has(&self, key: &str) -> bool {
        match self.route(CacheOptions::default()).await {
            Route::Backend => self.inner.backend.exists(key).await,
            Route::Local(local) => self.read_local(local, key).await.is_some(),
            Route::Nowhere => false,
        }
    }

    /// Remove every key starting with `prefix`
    ///
    /// Local storage is always swept when present; the backend is swept with
    /// a scan-and-delete when it is reachable. Returns `false` when neither
    /// store could be touched or a sweep failed.
    pub async fn clear_by_prefix(&self, prefix: &str) -> bool {
        let mut touched = false;
        let mut ok = true;

        if self.inner.backend.is_available().await {
            touched = true;
            ok &= self.inner.backend.delete_prefix(prefix).await;
        }

        if let Some(local) = self.inner.local.as_deref() {
            touched = true;
            let swept = local.keys().and_then(|keys| {
                let mut removed = 0usize;
                for key in keys.iter().filter(|k| k.starts_with(prefix)) {
                    local.remove_item(key)?;
                    removed += 1;
                }
                Ok(removed)
            });

            match swept {
                Ok(removed) => debug!(prefix = %prefix, removed, "Cleared local cache entries"),
                Err(e) => {
                    warn!(prefix = %prefix, "Failed to clear local cache entries: {}", e);
                    ok = false;
                }
            }
        }

        touched && ok
    }

    async fn route(&self, options: CacheOptions) -> Route<'_> {
        if self.inner.backend.is_available().await {
            return Route::Backend;
        }

        match self.inner.local.as_deref() {
            Some(local) if options.use_local_fallback => {
                self.inner.stats.lock().await.fallbacks += 1;
                Route::Local(local)
            }
            _ => {
                debug!(backend = self.inner.backend.name(), "Cache unavailable and no usable fallback");
                self.inner.stats.lock().await.failures += 1;
                Route::Nowhere
            }
        }
    }

    /// Read the envelope for `key`, dropping it when expired or unreadable
    async fn read_local(&self, local: &dyn LocalStorage, key: &str) -> Option<Value> {
        let text = match local.get_item(key) {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, "Failed to read local cache entry: {}", e);
                return None;
            }
        };

        let entry: CachedValue<Value> = match serde_json::from_str(&text) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, "Discarding malformed local cache entry: {}", e);
                if let Err(e) = local.remove_item(key) {
                    warn!(key = %key, "Failed to remove malformed local cache entry: {}", e);
                }
                return None;
            }
        };

        if entry.is_expired(self.inner.clock.now_millis()) {
            debug!(key = %key, "Local cache entry expired");
            if let Err(e) = local.remove_item(key) {
                warn!(key = %key, "Failed to remove expired local cache entry: {}", e);
            }
            self.inner.stats.lock().await.evictions_ttl += 1;
            return None;
        }

        Some(entry.into_value())
    }
}

/// Builder for [`CacheManager`]
#[derive(Default)]
pub struct CacheManagerBuilder {
    backend: Option<Arc<dyn Backend>>,
    local: Option<Arc<dyn LocalStorage>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CacheManagerBuilder {
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn local_storage(mut self, local: Arc<dyn LocalStorage>) -> Self {
        self.local = Some(local);
        self
    }

    pub fn local_storage_opt(mut self, local: Option<Arc<dyn LocalStorage>>) -> Self {
        self.local = local;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the manager; the backend defaults to [`NullBackend`]
    pub fn build(self) -> CacheManager {
        CacheManager {
            inner: Arc::new(Inner {
                backend: self.backend.unwrap_or_else(|| Arc::new(NullBackend)),
                local: self.local,
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                stats: Mutex::new(CacheStats::default()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::InMemoryBackend;
    use crate::cache::local::MemoryStorage;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn local_only(clock: &ManualClock) -> (CacheManager, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let cache = CacheManager::builder()
            .backend(Arc::new(NullBackend))
            .local_storage(storage.clone())
            .clock(Arc::new(clock.clone()))
            .build();
        (cache, storage)
    }

    #[tokio::test]
    async fn test_local_fallback_roundtrip() {
        let clock = ManualClock::starting_now();
        let (cache, storage) = local_only(&clock);

        assert!(cache.set("k", "v", CacheOptions::default()).await);
        assert_eq!(cache.get::<String>("k").await, Some("v".to_string()));
        assert!(cache.has("k").await);
        assert!(storage.get_item("k").unwrap().unwrap().contains("\"value\":\"v\""));

        let stats = cache.stats().await;
        assert_eq!(stats.local_hits, 1);
        assert!(stats.fallbacks >= 3);
    }

    #[tokio::test]
    async fn test_local_ttl_expiry_with_simulated_clock() {
        let clock = ManualClock::starting_now();
        let (cache, storage) = local_only(&clock);

        cache.set("k", &42u32, CacheOptions::seconds(30)).await;
        clock.advance(Duration::from_secs(29));
        assert_eq!(cache.get::<u32>("k").await, Some(42));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get::<u32>("k").await, None);
        assert!(storage.get_item("k").unwrap().is_none());
        assert_eq!(cache.stats().await.evictions_ttl, 1);
    }

    #[tokio::test]
    async fn test_expired_envelope_is_removed_on_read() {
        let clock = ManualClock::starting_now();
        let (cache, storage) = local_only(&clock);

        let past = clock.now_millis() - 1;
        storage
            .set_item("k", &format!(r#"{{"value":"x","expires":{}}}"#, past))
            .unwrap();

        assert_eq!(cache.get::<String>("k").await, None);
        assert!(storage.get_item("k").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_envelope_is_removed_on_read() {
        let clock = ManualClock::starting_now();
        let (cache, storage) = local_only(&clock);

        storage.set_item("k", "{ not an envelope").unwrap();

        assert_eq!(cache.get::<String>("k").await, None);
        assert!(storage.get_item("k").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_key_succeeds() {
        let clock = ManualClock::starting_now();
        let (cache, _) = local_only(&clock);

        assert!(cache.delete("never-set").await);
    }

    #[tokio::test]
    async fn test_no_backend_no_fallback_is_noop() {
        let cache = CacheManager::builder().build();

        assert!(!cache.set("k", "v", CacheOptions::default()).await);
        assert_eq!(cache.get::<String>("k").await, None);
        assert!(!cache.has("k").await);
        assert!(!cache.delete("k").await);
        assert!(!cache.clear_by_prefix("k").await);
        assert!(cache.stats().await.failures > 0);
    }

    #[tokio::test]
    async fn test_fallback_can_be_disabled_per_call() {
        let clock = ManualClock::starting_now();
        let (cache, storage) = local_only(&clock);

        let options = CacheOptions::builder().use_local_fallback(false).build();
        assert!(!cache.set("k", "v", options).await);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_backend_preferred_when_available() {
        let backend = Arc::new(InMemoryBackend::new());
        let storage = Arc::new(MemoryStorage::new());
        let cache = CacheManager::new(backend.clone(), Some(storage.clone()));

        assert!(cache.set("k", &vec![1, 2, 3], CacheOptions::minutes(1)).await);
        assert!(storage.is_empty());
        assert_eq!(cache.get::<Vec<i32>>("k").await, Some(vec![1, 2, 3]));
        assert_eq!(cache.stats().await.backend_hits, 1);

        // Backend goes away: the local store is consulted and is empty
        backend.set_available(false);
        assert_eq!(cache.get::<Vec<i32>>("k").await, None);
    }

    #[tokio::test]
    async fn test_clear_by_prefix_sweeps_both_layers() {
        let backend = Arc::new(InMemoryBackend::new());
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("user_role_9", "{\"value\":\"admin\"}").unwrap();
        storage.set_item("other", "{\"value\":1}").unwrap();

        let cache = CacheManager::new(backend.clone(), Some(storage.clone()));
        cache.set("user_role_1", "client", CacheOptions::default()).await;

        assert!(cache.clear_by_prefix("user_role_").await);
        assert!(backend.is_empty().await);
        assert_eq!(storage.keys().unwrap(), vec!["other".to_string()]);
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_a_miss() {
        let clock = ManualClock::starting_now();
        let (cache, _) = local_only(&clock);

        cache.set("k", "not a number", CacheOptions::default()).await;
        assert_eq!(cache.get::<u64>("k").await, None);
    }
}
