//! Backend capability selected once at startup
//!
//! [`CacheManager`](crate::cache::CacheManager) talks to exactly one
//! [`Backend`]. Which one is decided by configuration when the application
//! starts, not by branching inside every call.

use crate::cache::entry::CachedValue;
use crate::clock::{Clock, SystemClock};
use crate::remote::RemoteCache;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// A key/value store that may or may not be reachable
///
/// Implementations never fail loudly: unavailable or broken stores answer
/// with `false`/`None`/empty results.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Probe reachability. Callers probe on every operation.
    async fn is_available(&self) -> bool;

    async fn get(&self, key: &str) -> Option<Value>;

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> bool;

    async fn delete(&self, key: &str) -> bool;

    async fn exists(&self, key: &str) -> bool;

    /// Delete every key starting with `prefix`
    async fn delete_prefix(&self, prefix: &str) -> bool;
}

/// Backend for deployments without a cache service
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

#[async_trait]
impl Backend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn is_available(&self) -> bool {
        false
    }

    async fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    async fn set(&self, _key: &str, _value: &Value, _ttl: Option<Duration>) -> bool {
        false
    }

    async fn delete(&self, _key: &str) -> bool {
        false
    }

    async fn exists(&self, _key: &str) -> bool {
        false
    }

    async fn delete_prefix(&self, _prefix: &str) -> bool {
        false
    }
}

/// Backend over the hosted REST key-value service
pub struct RemoteBackend {
    remote: Arc<RemoteCache>,
}

impl RemoteBackend {
    pub fn new(remote: Arc<RemoteCache>) -> Self {
        Self { remote }
    }

    pub fn remote(&self) -> &Arc<RemoteCache> {
        &self.remote
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn is_available(&self) -> bool {
        self.remote.is_available().await
    }

    async fn get(&self, key: &str) -> Option<Value> {
        self.remote.get(key).await
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> bool {
        self.remote.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> bool {
        self.remote.del(key).await
    }

    async fn exists(&self, key: &str) -> bool {
        self.remote.exists(key).await
    }

    async fn delete_prefix(&self, prefix: &str) -> bool {
        let keys = self.remote.scan_keys(prefix).await;
        let mut ok = true;
        for key in keys {
            ok &= self.remote.del(&key).await;
        }
        ok
    }
}

/// In-process backend with TTL support
///
/// Useful for single-node deployments and for tests; availability can be
/// switched off to exercise the local fallback path.
pub struct InMemoryBackend {
    entries: RwLock<HashMap<String, CachedValue<Value>>>,
    available: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            clock,
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        let now = self.clock.now_millis();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn up(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn is_available(&self) -> bool {
        self.up()
    }

    async fn get(&self, key: &str) -> Option<Value> {
        if !self.up() {
            return None;
        }
        let now = self.clock.now_millis();
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> bool {
        if !self.up() {
            return false;
        }
        let entry = CachedValue::new(value.clone(), self.clock.now_millis(), ttl);
        self.entries.write().await.insert(key.to_string(), entry);
        true
    }

    async fn delete(&self, key: &str) -> bool {
        if !self.up() {
            return false;
        }
        self.entries.write().await.remove(key);
        true
    }

    async fn exists(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    async fn delete_prefix(&self, prefix: &str) -> bool {
        if !self.up() {
            return false;
        }
        self.entries
            .write()
            .await
            .retain(|key, _| !key.starts_with(prefix));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn test_null_backend_is_never_available() {
        let backend = NullBackend;
        assert!(!backend.is_available().await);
        assert!(!backend.set("k", &Value::Bool(true), None).await);
        assert_eq!(backend.get("k").await, None);
    }

    #[tokio::test]
    async fn test_in_memory_backend_ttl() {
        let clock = ManualClock::starting_now();
        let backend = InMemoryBackend::with_clock(Arc::new(clock.clone()));

        backend
            .set("k", &Value::from("v"), Some(Duration::from_secs(10)))
            .await;
        assert!(backend.exists("k").await);

        clock.advance(Duration::from_secs(11));
        assert!(!backend.exists("k").await);
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_in_memory_backend_toggle() {
        let backend = InMemoryBackend::new();
        backend.set("k", &Value::from(1), None).await;

        backend.set_available(false);
        assert!(!backend.is_available().await);
        assert_eq!(backend.get("k").await, None);

        backend.set_available(true);
        assert_eq!(backend.get("k").await, Some(Value::from(1)));
    }

    #[tokio::test]
    async fn test_in_memory_delete_prefix() {
        let backend = InMemoryBackend::new();
        backend.set("user_role_1", &Value::from("admin"), None).await;
        backend.set("user_role_2", &Value::from("client"), None).await;
        backend.set("smartpro_user", &Value::Null, None).await;

        assert!(backend.delete_prefix("user_role_").await);
        assert_eq!(backend.len().await, 1);
    }
}
