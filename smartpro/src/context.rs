//! Application wiring
//!
//! [`AppContext`] is built once at startup and passed to whatever needs the
//! session manager or the role authorizer.

use crate::auth::{AuthProvider, ProfileStore};
use crate::config::AppConfig;
use crate::error::Result;
use crate::role::RoleAuthorizer;
use crate::session::SessionManager;
use smartpro_cache::{
    Backend, CacheManager, FileStorage, LocalStorage, NullBackend, RemoteBackend, RemoteCache,
};
use std::sync::Arc;
use tracing::{info, warn};

/// The cache, session manager and role authorizer of one process
#[derive(Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub cache: CacheManager,
    pub sessions: SessionManager,
    pub roles: RoleAuthorizer,
}

impl AppContext {
    /// Validate `config` and build every component on top of one cache
    pub fn new(config: AppConfig, auth: Arc<dyn AuthProvider>, profiles: Arc<dyn ProfileStore>) -> Result<Self> {
        config.validate()?;

        let backend: Arc<dyn Backend> = match &config.remote_cache {
            Some(remote) => Arc::new(RemoteBackend::new(Arc::new(RemoteCache::new(remote.clone())))),
            None => Arc::new(NullBackend),
        };

        let local: Option<Arc<dyn LocalStorage>> = match &config.local_storage_path {
            Some(path) => match FileStorage::open(path) {
                Ok(storage) => Some(Arc::new(storage)),
                Err(e) => {
                    warn!(path = %path.display(), "Local storage unavailable, continuing without it: {}", e);
                    None
                }
            },
            None => None,
        };

        info!(
            backend = backend.name(),
            local_storage = local.is_some(),
            dev_mode = config.role.dev_mode,
            auth_configured = config.role.auth_configured,
            "Building application context"
        );

        Ok(Self::with_cache(config, CacheManager::new(backend, local), auth, profiles))
    }

    /// Build on an existing cache manager
    pub fn with_cache(
        config: AppConfig,
        cache: CacheManager,
        auth: Arc<dyn AuthProvider>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        let sessions = SessionManager::new(auth, cache.clone(), config.session.clone());
        let roles = RoleAuthorizer::new(cache.clone(), profiles, config.role.clone());

        Self {
            config,
            cache,
            sessions,
            roles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeAuthProvider, StaticProfileStore};
    use smartpro_cache::RemoteCacheConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_builds_with_local_storage_only() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::default().with_local_storage_path(Some(dir.path().join("storage.json")));

        let ctx = AppContext::new(
            config,
            Arc::new(FakeAuthProvider::signed_out()),
            Arc::new(StaticProfileStore::new()),
        )
        .unwrap();

        assert_eq!(ctx.cache.backend_name(), "null");
        assert!(ctx.cache.has_local_storage());
    }

    #[tokio::test]
    async fn test_unreadable_local_storage_is_skipped() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be read as the storage file
        let config = AppConfig::default().with_local_storage_path(Some(dir.path().to_path_buf()));

        let ctx = AppContext::new(
            config,
            Arc::new(FakeAuthProvider::signed_out()),
            Arc::new(StaticProfileStore::new()),
        )
        .unwrap();

        assert!(!ctx.cache.has_local_storage());
    }

    #[tokio::test]
    async fn test_selects_remote_backend_when_configured() {
        let config = AppConfig::default()
            .with_remote_cache(Some(RemoteCacheConfig::new("http://127.0.0.1:9", "token")));

        let ctx = AppContext::new(
            config,
            Arc::new(FakeAuthProvider::signed_out()),
            Arc::new(StaticProfileStore::new()),
        )
        .unwrap();

        assert_eq!(ctx.cache.backend_name(), "remote");
        assert!(!ctx.cache.has_local_storage());
    }
}
