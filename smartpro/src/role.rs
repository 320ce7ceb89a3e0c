//! Role resolution and the role gate
//!
//! [`RoleAuthorizer`] resolves a user's role through the cache and the
//! profile store. [`RoleGuard`] is the per-view gate built on it: it follows
//! the published [`AuthContext`], exposes a [`RoleAuthState`] and redirects
//! through a [`Navigator`] when the user is signed out or not allowed.

use crate::auth::{AuthContext, ProfileStore, Role, User};
use crate::config::RoleAuthConfig;
use futures::FutureExt;
use serde::Serialize;
use smartpro_cache::{CacheManager, CacheOptions};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Prefix of cached role entries
pub const ROLE_KEY_PREFIX: &str = "user_role_";

/// Default login page
pub const LOGIN_PATH: &str = "/login";

/// Cache key holding the role of `user_id`
pub fn role_cache_key(user_id: &str) -> String {
    format!("{}{}", ROLE_KEY_PREFIX, user_id)
}

/// `redirect_to?redirect=<current_path>` with the path form-encoded
pub fn login_redirect(redirect_to: &str, current_path: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(current_path.as_bytes()).collect();
    format!("{}?redirect={}", redirect_to, encoded)
}

/// Landing page for `role`
pub fn dashboard_path(role: &Role) -> &'static str {
    role.dashboard_path()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Resolves and caches user roles
#[derive(Clone)]
pub struct RoleAuthorizer {
    inner: Arc<AuthorizerInner>,
}

struct AuthorizerInner {
    cache: CacheManager,
    profiles: Arc<dyn ProfileStore>,
    config: RoleAuthConfig,
}

impl RoleAuthorizer {
    pub fn new(cache: CacheManager, profiles: Arc<dyn ProfileStore>, config: RoleAuthConfig) -> Self {
        Self {
            inner: Arc::new(AuthorizerInner {
                cache,
                profiles,
                config,
            }),
        }
    }

    pub fn config(&self) -> &RoleAuthConfig {
        &self.inner.config
    }

    /// Role of `user_id`, from the cache or the profile store
    ///
    /// Transient store failures are retried. Returns `None` when the store
    /// fails or has no role; the caller picks the default.
    pub async fn fetch_user_role(&self, user_id: &str) -> Option<Role> {
        let key = role_cache_key(user_id);

        if let Some(role) = self.inner.cache.get::<Role>(&key).await {
            debug!(user_id = %user_id, role = %role, "Role cache hit");
            return Some(role);
        }

        let profiles = &self.inner.profiles;
        let fetched = self
            .inner
            .config
            .retry
            .run("get_role", || profiles.get_role(user_id))
            .await;

        match fetched {
            Ok(Some(role)) => {
                let options = CacheOptions::ttl(self.inner.config.role_ttl);
                if !self.inner.cache.set(&key, &role, options).await {
                    debug!(user_id = %user_id, "Role not cached");
                }
                Some(role)
            }
            Ok(None) => {
                debug!(user_id = %user_id, "Profile has no role");
                None
            }
            Err(e) => {
                warn!(user_id = %user_id, "Failed to fetch user role: {}", e);
                None
            }
        }
    }

    /// Role of `user_id`, falling back to the default role
    pub async fn resolve(&self, user_id: &str) -> Role {
        match self.fetch_user_role(user_id).await {
            Some(role) => role,
            None => self.inner.config.default_role.clone(),
        }
    }

    /// Like [`resolve`](Self::resolve) but bounded by the safety timeout
    ///
    /// The lookup keeps running in the background after the deadline so a
    /// late answer still lands in the cache.
    pub async fn resolve_within_timeout(&self, user_id: &str) -> Role {
        let authorizer = self.clone();
        let id = user_id.to_string();
        let lookup = tokio::spawn(async move { authorizer.resolve(&id).await });

        match tokio::time::timeout(self.inner.config.safety_timeout, lookup).await {
            Ok(Ok(role)) => role,
            Ok(Err(e)) => {
                warn!(user_id = %user_id, "Role lookup task failed: {}", e);
                self.inner.config.default_role.clone()
            }
            Err(_) => {
                warn!(user_id = %user_id, "Role lookup timed out, using default role");
                self.inner.config.default_role.clone()
            }
        }
    }

    /// Drop the cached role so the next fetch reads the profile store
    pub async fn invalidate_role(&self, user_id: &str) -> bool {
        let removed = self.inner.cache.delete(&role_cache_key(user_id)).await;
        info!(user_id = %user_id, removed, "Invalidated cached role");
        removed
    }

    /// Drop every cached role
    pub async fn invalidate_all_roles(&self) -> bool {
        let cleared = self.inner.cache.clear_by_prefix(ROLE_KEY_PREFIX).await;
        info!(cleared, "Invalidated all cached roles");
        cleared
    }
}

/// What the role gate currently knows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleAuthState {
    pub is_loading: bool,
    pub is_authorized: bool,
    pub user_role: Option<Role>,
    pub user: Option<User>,
    pub error: Option<String>,
}

impl Default for RoleAuthState {
    fn default() -> Self {
        Self {
            is_loading: true,
            is_authorized: false,
            user_role: None,
            user: None,
            error: None,
        }
    }
}

/// Performs client-side navigation
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Settings of one role gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGuardOptions {
    pub allowed_roles: Vec<Role>,
    /// Login page for signed-out users
    pub redirect_to: String,
    /// Path of the guarded view, sent back after login
    pub current_path: String,
}

impl RoleGuardOptions {
    pub fn new(allowed_roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            allowed_roles: allowed_roles.into_iter().collect(),
            redirect_to: LOGIN_PATH.to_string(),
            current_path: "/".to_string(),
        }
    }

    pub fn with_redirect_to(mut self, redirect_to: impl Into<String>) -> Self {
        self.redirect_to = redirect_to.into();
        self
    }

    pub fn with_current_path(mut self, path: impl Into<String>) -> Self {
        self.current_path = path.into();
        self
    }

    pub fn allows(&self, role: &Role) -> bool {
        self.allowed_roles.contains(role)
    }
}

/// A mounted role gate
///
/// Re-evaluates on every [`AuthContext`] change. Dropping the guard stops
/// its tasks.
pub struct RoleGuard {
    shared: Arc<GuardShared>,
    effect: JoinHandle<()>,
}

struct GuardShared {
    authorizer: RoleAuthorizer,
    options: RoleGuardOptions,
    navigator: Arc<dyn Navigator>,
    state: watch::Sender<RoleAuthState>,
    safety: Mutex<Option<JoinHandle<()>>>,
    last_redirect: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl RoleGuard {
    /// Start gating a view
    pub fn mount(
        authorizer: RoleAuthorizer,
        mut auth: watch::Receiver<AuthContext>,
        options: RoleGuardOptions,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let (state, _) = watch::channel(RoleAuthState::default());
        let shared = Arc::new(GuardShared {
            authorizer,
            options,
            navigator,
            state,
            safety: Mutex::new(None),
            last_redirect: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        let task_shared = Arc::clone(&shared);
        let effect = tokio::spawn(async move {
            loop {
                let context = auth.borrow_and_update().clone();
                task_shared.begin_evaluation();

                let evaluation = task_shared.run_effect(context);
                tokio::pin!(evaluation);

                // A newer auth context abandons the running evaluation
                let restart = tokio::select! {
                    _ = &mut evaluation => false,
                    changed = auth.changed() => match changed {
                        Ok(()) => true,
                        Err(_) => {
                            evaluation.await;
                            false
                        }
                    },
                };

                if restart {
                    debug!("Auth context changed mid-evaluation, restarting role check");
                    continue;
                }
                if auth.changed().await.is_err() {
                    debug!("Auth context closed, role gate idle");
                    break;
                }
            }
        });

        Self { shared, effect }
    }

    pub fn state(&self) -> RoleAuthState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RoleAuthState> {
        self.shared.state.subscribe()
    }

    /// Wait until the gate has settled
    pub async fn wait_until_loaded(&self) -> RoleAuthState {
        let mut rx = self.subscribe();
        let settled = match rx.wait_for(|state| !state.is_loading).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        settled
    }
}

impl Drop for RoleGuard {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.effect.abort();
        if let Some(timer) = lock(&self.shared.safety).take() {
            timer.abort();
        }
    }
}

impl GuardShared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Reset per-evaluation state and restart the safety ceiling
    fn begin_evaluation(self: &Arc<Self>) {
        lock(&self.last_redirect).take();
        self.arm_safety_timer();
    }

    fn arm_safety_timer(self: &Arc<Self>) {
        let shared = Arc::clone(self);
        let timeout = self.authorizer.config().safety_timeout;

        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if shared.is_closed() {
                return;
            }

            let default_role = shared.authorizer.config().default_role.clone();
            let mut forced = false;
            shared.state.send_if_modified(|state| {
                if !state.is_loading {
                    return false;
                }
                state.is_loading = false;
                if state.user_role.is_none() {
                    state.is_authorized = shared.options.allows(&default_role);
                    state.user_role = Some(default_role.clone());
                }
                forced = true;
                true
            });

            if forced {
                warn!(timeout_ms = timeout.as_millis() as u64, "Role check timed out");
                shared.redirect_if_unauthorized();
            }
        });

        if let Some(previous) = lock(&self.safety).replace(timer) {
            previous.abort();
        }
    }

    async fn run_effect(&self, context: AuthContext) {
        let outcome = AssertUnwindSafe(self.evaluate(context)).catch_unwind().await;

        if let Err(panic) = outcome {
            let message = panic_message(panic.as_ref());
            warn!("Role check panicked: {}", message);

            let role = self.authorizer.config().default_role.clone();
            let authorized = self.options.allows(&role);
            self.state.send_modify(|state| {
                state.is_loading = false;
                state.is_authorized = authorized;
                state.user_role = Some(role);
                state.error = Some(message);
            });
            self.redirect_if_unauthorized();
        }
    }

    async fn evaluate(&self, context: AuthContext) {
        if context.is_pending() {
            debug!("Auth still initializing");
            return;
        }

        let config = self.authorizer.config();
        if config.bypass() {
            debug!(dev_mode = config.dev_mode, "Role check bypassed");
            self.state.send_replace(RoleAuthState {
                is_loading: false,
                is_authorized: true,
                user_role: Some(config.default_role.clone()),
                user: context.user,
                error: None,
            });
            return;
        }

        let Some(user) = context.user else {
            self.state.send_replace(RoleAuthState {
                is_loading: false,
                ..RoleAuthState::default()
            });
            let target = login_redirect(&self.options.redirect_to, &self.options.current_path);
            self.navigate(target);
            return;
        };

        self.state.send_modify(|state| {
            state.is_loading = true;
            state.user = Some(user.clone());
            state.error = None;
        });

        let role = self.authorizer.resolve(&user.id).await;
        let authorized = self.options.allows(&role);
        debug!(user_id = %user.id, role = %role, authorized, "Role resolved");

        self.state.send_modify(|state| {
            state.is_loading = false;
            state.is_authorized = authorized;
            state.user_role = Some(role);
        });
        self.redirect_if_unauthorized();
    }

    /// Send a settled, disallowed user to their own dashboard
    fn redirect_if_unauthorized(&self) {
        let target = {
            let state = self.state.borrow();
            match &state.user_role {
                Some(role) if !state.is_loading && !state.is_authorized => Some(dashboard_path(role)),
                _ => None,
            }
        };

        if let Some(target) = target {
            self.navigate(target.to_string());
        }
    }

    /// Navigate once per evaluation; the effect and the safety timer may
    /// both ask for the same target
    fn navigate(&self, target: String) {
        if self.is_closed() {
            return;
        }
        let mut last = lock(&self.last_redirect);
        if last.as_deref() == Some(target.as_str()) {
            return;
        }
        info!(to = %target, from = %self.options.current_path, "Redirecting");
        self.navigator.navigate(&target);
        *last = Some(target);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "role check panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProfileError;
    use crate::retry::RetryPolicy;
    use crate::testing::{FlakyProfileStore, StaticProfileStore};
    use async_trait::async_trait;
    use smartpro_cache::MemoryStorage;
    use std::time::Duration;

    fn cache() -> CacheManager {
        CacheManager::builder()
            .local_storage(Arc::new(MemoryStorage::new()))
            .build()
    }

    #[test]
    fn test_login_redirect_encodes_path() {
        assert_eq!(login_redirect("/login", "/admin/users"), "/login?redirect=%2Fadmin%2Fusers");
        assert_eq!(
            login_redirect("/auth/sign-in", "/client/bookings?id=7"),
            "/auth/sign-in?redirect=%2Fclient%2Fbookings%3Fid%3D7"
        );
    }

    #[test]
    fn test_options_allow() {
        let options = RoleGuardOptions::new([Role::Admin, Role::Provider]);
        assert!(options.allows(&Role::Admin));
        assert!(!options.allows(&Role::Client));
        assert_eq!(options.redirect_to, "/login");
    }

    #[tokio::test]
    async fn test_fetch_caches_role() {
        let store = Arc::new(StaticProfileStore::new().with_role("u1", Role::Provider));
        let authorizer = RoleAuthorizer::new(cache(), store.clone(), RoleAuthConfig::default());

        assert_eq!(authorizer.fetch_user_role("u1").await, Some(Role::Provider));
        assert_eq!(authorizer.fetch_user_role("u1").await, Some(Role::Provider));
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_role_is_not_cached() {
        let store = Arc::new(StaticProfileStore::new());
        let authorizer = RoleAuthorizer::new(cache(), store.clone(), RoleAuthConfig::default());

        assert_eq!(authorizer.fetch_user_role("u1").await, None);
        assert_eq!(authorizer.resolve("u1").await, Role::Client);
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let store = Arc::new(FlakyProfileStore::new(1, ProfileError::Timeout, Some(Role::Admin)));
        let authorizer = RoleAuthorizer::new(cache(), store.clone(), RoleAuthConfig::default());

        assert_eq!(authorizer.fetch_user_role("u1").await, Some(Role::Admin));
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_yield_none() {
        let store = Arc::new(FlakyProfileStore::new(5, ProfileError::Network("down".into()), Some(Role::Admin)));
        let config = RoleAuthConfig::default().with_retry(RetryPolicy::new(2, Duration::from_millis(200)));
        let authorizer = RoleAuthorizer::new(cache(), store.clone(), config);

        assert_eq!(authorizer.fetch_user_role("u1").await, None);
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_role_forces_refetch() {
        let store = Arc::new(StaticProfileStore::new().with_role("u1", Role::Client));
        let authorizer = RoleAuthorizer::new(cache(), store.clone(), RoleAuthConfig::default());
        assert_eq!(authorizer.fetch_user_role("u1").await, Some(Role::Client));

        store.set_role("u1", Role::Admin);
        assert_eq!(authorizer.fetch_user_role("u1").await, Some(Role::Client));

        assert!(authorizer.invalidate_role("u1").await);
        assert_eq!(authorizer.fetch_user_role("u1").await, Some(Role::Admin));
    }

    #[tokio::test]
    async fn test_invalidate_all_roles_forces_refetch_for_every_user() {
        let store = Arc::new(
            StaticProfileStore::new()
                .with_role("u1", Role::Client)
                .with_role("u2", Role::Provider),
        );
        let authorizer = RoleAuthorizer::new(cache(), store.clone(), RoleAuthConfig::default());
        authorizer.fetch_user_role("u1").await;
        authorizer.fetch_user_role("u2").await;
        authorizer.fetch_user_role("u1").await;
        assert_eq!(store.calls(), 2);

        store.set_role("u1", Role::Admin);
        assert!(authorizer.invalidate_all_roles().await);

        assert_eq!(authorizer.fetch_user_role("u1").await, Some(Role::Admin));
        assert_eq!(authorizer.fetch_user_role("u2").await, Some(Role::Provider));
        assert_eq!(store.calls(), 4);
    }

    struct PanickingProfileStore;

    #[async_trait]
    impl ProfileStore for PanickingProfileStore {
        async fn get_role(&self, _user_id: &str) -> Result<Option<Role>, ProfileError> {
            panic!("profile decoder blew up");
        }
    }

    #[tokio::test]
    async fn test_panicking_lookup_defaults_to_client() {
        let authorizer = RoleAuthorizer::new(cache(), Arc::new(PanickingProfileStore), RoleAuthConfig::default());
        let (_tx, rx) = watch::channel(AuthContext::resolved(Some(User::new("u1"))));
        let navigator = Arc::new(crate::testing::RecordingNavigator::new());

        let guard = RoleGuard::mount(
            authorizer,
            rx,
            RoleGuardOptions::new([Role::Client]).with_current_path("/client/home"),
            navigator.clone(),
        );
        let state = guard.wait_until_loaded().await;

        assert_eq!(state.user_role, Some(Role::Client));
        assert!(state.is_authorized);
        assert_eq!(state.error.as_deref(), Some("profile decoder blew up"));
        assert!(navigator.paths().is_empty());
    }
}
