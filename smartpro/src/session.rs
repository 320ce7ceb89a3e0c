//! Session memoization and proactive refresh
//!
//! [`SessionManager`] owns the cached [`SessionInfo`] snapshot. It answers
//! repeated checks from the cache for a short freshness window, classifies
//! auth-service results into a small state machine, and arms a single timer
//! that refreshes the session shortly before it expires.

use crate::auth::{AuthContext, AuthProvider, Session, User};
use crate::config::SessionConfig;
use crate::error::AuthError;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use smartpro_cache::{CacheManager, CacheOptions};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Cached session snapshot
pub const SESSION_INFO_KEY: &str = "smartpro_session_info";
/// Cached user payload
pub const USER_KEY: &str = "smartpro_user";
/// Advisory marker written while a refresh is armed
pub const REFRESH_FLAG_KEY: &str = "smartpro_refresh_scheduled";

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Authenticated,
    Unauthenticated,
    Loading,
    Error,
}

/// Result of the last session check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub last_checked_at: DateTime<Utc>,
    /// Session expiry as epoch seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl SessionInfo {
    pub fn loading(now: DateTime<Utc>) -> Self {
        Self {
            status: SessionStatus::Loading,
            error: None,
            last_checked_at: now,
            expires_at: None,
        }
    }

    pub fn authenticated(now: DateTime<Utc>, expires_at: Option<i64>) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            error: None,
            last_checked_at: now,
            expires_at,
        }
    }

    pub fn unauthenticated(now: DateTime<Utc>, error: Option<String>) -> Self {
        Self {
            status: SessionStatus::Unauthenticated,
            error,
            last_checked_at: now,
            expires_at: None,
        }
    }

    pub fn failed(now: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            status: SessionStatus::Error,
            error: Some(error.into()),
            last_checked_at: now,
            expires_at: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    /// Whether this snapshot may be reused at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>, freshness: Duration) -> bool {
        match (now - self.last_checked_at).to_std() {
            Ok(age) => age < freshness,
            // Checked "in the future": clock moved backwards
            Err(_) => false,
        }
    }
}

/// Memoizes the auth session and keeps it refreshed
///
/// Cloning is cheap; clones share the cache, the timer and the published
/// [`AuthContext`]. The armed timer is cancelled by [`shutdown`](Self::shutdown)
/// or when the last clone is dropped.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    auth: Arc<dyn AuthProvider>,
    cache: CacheManager,
    config: SessionConfig,
    /// Single-flight refresh timer
    timer: Mutex<Option<JoinHandle<()>>>,
    /// Last snapshot, used when the cache cannot hold one
    last: Mutex<Option<SessionInfo>>,
    /// Last signed-in user, same purpose
    user: Mutex<Option<User>>,
    context: watch::Sender<AuthContext>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.timer).take() {
            handle.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionManager {
    pub fn new(auth: Arc<dyn AuthProvider>, cache: CacheManager, config: SessionConfig) -> Self {
        let (context, _) = watch::channel(AuthContext::default());
        Self {
            inner: Arc::new(Inner {
                auth,
                cache,
                config,
                timer: Mutex::new(None),
                last: Mutex::new(None),
                user: Mutex::new(None),
                context,
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Watch the auth snapshot; starts as loading and uninitialized
    pub fn subscribe(&self) -> watch::Receiver<AuthContext> {
        self.inner.context.subscribe()
    }

    /// Current auth snapshot
    pub fn auth_context(&self) -> AuthContext {
        self.inner.context.borrow().clone()
    }

    /// Signed-in user, if any
    ///
    /// Served from memory, or from the cache after a restart.
    pub async fn current_user(&self) -> Option<User> {
        if let Some(user) = lock(&self.inner.user).clone() {
            return Some(user);
        }
        self.inner.cache.get(USER_KEY).await
    }

    /// Whether a refresh timer is currently armed
    pub fn is_refresh_scheduled(&self) -> bool {
        lock(&self.inner.timer)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Return the session state, asking the auth service at most once per
    /// freshness window
    pub async fn check_session(&self) -> SessionInfo {
        let now = self.inner.cache.clock().now();

        if let Some(info) = self.snapshot().await {
            if info.is_fresh(now, self.inner.config.freshness) {
                debug!(status = ?info.status, "Reusing fresh session snapshot");
                if self.inner.context.borrow().is_pending() {
                    self.publish(&info).await;
                }
                return info;
            }
        }

        let auth = &self.inner.auth;
        let result = self
            .inner
            .config
            .get_session_retry
            .run("get_session", || auth.get_session())
            .await;

        self.settle(result, Duration::ZERO).await
    }

    /// Arm a refresh ahead of `expires_at` (epoch seconds)
    ///
    /// Does nothing without an expiry or when a refresh is already armed.
    /// Within the refresh lead window the refresh starts right away on a
    /// separate task.
    pub async fn schedule_refresh(&self, expires_at: Option<i64>) {
        self.schedule(expires_at, Duration::ZERO).await;
    }

    /// Refresh the session now, cancelling any armed timer
    pub async fn refresh_session(&self) -> SessionInfo {
        self.run_refresh(false).await
    }

    /// Sign out at the auth service and forget all local session state
    ///
    /// Local state is cleared even when the auth service call fails.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let result = self.inner.auth.sign_out().await;
        if let Err(e) = &result {
            warn!("Sign-out request failed, clearing local session anyway: {}", e);
        }

        self.cancel_timer();
        let cache = &self.inner.cache;
        cache.delete(REFRESH_FLAG_KEY).await;
        cache.delete(USER_KEY).await;
        cache.delete(SESSION_INFO_KEY).await;
        lock(&self.inner.last).take();
        lock(&self.inner.user).take();

        self.inner.context.send_replace(AuthContext::resolved(None));
        info!("Signed out");
        result
    }

    /// Cancel the armed refresh timer and drop its flag
    pub async fn shutdown(&self) {
        self.cancel_timer();
        self.inner.cache.delete(REFRESH_FLAG_KEY).await;
    }

    async fn snapshot(&self) -> Option<SessionInfo> {
        match self.inner.cache.get::<SessionInfo>(SESSION_INFO_KEY).await {
            Some(info) => Some(info),
            None => lock(&self.inner.last).clone(),
        }
    }

    async fn run_refresh(&self, from_timer: bool) -> SessionInfo {
        let pending = lock(&self.inner.timer).take();
        if let Some(handle) = pending {
            // The timer's own handle is only detached
            if !from_timer {
                handle.abort();
            }
        }
        self.inner.cache.delete(REFRESH_FLAG_KEY).await;

        let auth = &self.inner.auth;
        let existing = self
            .inner
            .config
            .get_session_retry
            .run("get_session", || auth.get_session())
            .await;

        match existing {
            Ok(Some(_)) => {}
            Ok(None) | Err(AuthError::NoSession) => {
                debug!("No session left to refresh");
                return self.settle(Ok(None), Duration::ZERO).await;
            }
            Err(e) => return self.settle(Err(e), Duration::ZERO).await,
        }

        info!("Refreshing session");
        let result = self
            .inner
            .config
            .refresh_retry
            .run("refresh_session", || auth.refresh_session())
            .await;

        self.settle(result, self.inner.config.min_rearm_delay).await
    }

    /// Classify an auth result, persist and publish it, and re-arm on success
    async fn settle(&self, result: Result<Option<Session>, AuthError>, min_delay: Duration) -> SessionInfo {
        let clock = self.inner.cache.clock();
        let now = clock.now();

        let (info, user) = match result {
            Ok(Some(session)) if session.expires_at.is_some_and(|t| t <= now.timestamp()) => {
                (SessionInfo::unauthenticated(now, Some("Session expired".into())), None)
            }
            Ok(Some(session)) => (SessionInfo::authenticated(now, session.expires_at), Some(session.user)),
            Ok(None) | Err(AuthError::NoSession) => (SessionInfo::unauthenticated(now, None), None),
            Err(e) => {
                warn!("Session check failed: {}", e);
                (SessionInfo::failed(now, e.to_string()), None)
            }
        };

        match (&info.status, user) {
            (SessionStatus::Authenticated, Some(user)) => {
                let options = CacheOptions::ttl(self.inner.config.user_ttl);
                if !self.inner.cache.set(USER_KEY, &user, options).await {
                    debug!(user_id = %user.id, "User payload not cached");
                }
                *lock(&self.inner.user) = Some(user);
            }
            (SessionStatus::Unauthenticated, _) => {
                lock(&self.inner.user).take();
                self.inner.cache.delete(USER_KEY).await;
            }
            // Errors keep whatever user is stored
            _ => {}
        }

        self.persist(&info).await;
        self.publish(&info).await;

        if info.is_authenticated() {
            self.schedule(info.expires_at, min_delay).await;
        }

        info
    }

    async fn persist(&self, info: &SessionInfo) {
        let previous = lock(&self.inner.last).replace(info.clone());
        if previous.map(|p| p.status) != Some(info.status) {
            info!(status = ?info.status, error = ?info.error, "Session status changed");
        }
        self.inner
            .cache
            .set(SESSION_INFO_KEY, info, CacheOptions::default())
            .await;
    }

    async fn publish(&self, info: &SessionInfo) {
        let user = match info.status {
            SessionStatus::Authenticated | SessionStatus::Error => self.current_user().await,
            SessionStatus::Unauthenticated | SessionStatus::Loading => None,
        };
        let next = AuthContext::resolved(user);
        // Unchanged snapshots do not wake subscribers
        self.inner.context.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    async fn schedule(&self, expires_at: Option<i64>, min_delay: Duration) {
        let Some(expires_at) = expires_at else {
            return;
        };
        if self.is_refresh_scheduled() {
            debug!("Refresh already armed");
            return;
        }
        if self.inner.cache.get::<bool>(REFRESH_FLAG_KEY).await == Some(true) {
            debug!("Refresh flag present, not arming another timer");
            return;
        }

        let now = self.inner.cache.clock().now_secs();
        let lead = self.inner.config.refresh_lead.as_secs() as i64;
        let until_refresh = expires_at - now - lead;

        let wait = if until_refresh <= 0 {
            min_delay
        } else {
            Duration::from_secs(until_refresh as u64).max(min_delay)
        };

        if !self.arm(wait) {
            return;
        }

        if wait.is_zero() {
            debug!(expires_at, "Session inside refresh window, refreshing now");
        } else {
            debug!(expires_at, wait_secs = wait.as_secs(), "Refresh armed");
            self.inner
                .cache
                .set(REFRESH_FLAG_KEY, &true, CacheOptions::ttl(wait))
                .await;
        }
    }

    /// Put a new timer in the slot unless one is still running
    fn arm(&self, wait: Duration) -> bool {
        let mut slot = lock(&self.inner.timer);
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }
        *slot = Some(tokio::spawn(refresh_after(Arc::downgrade(&self.inner), wait)));
        true
    }

    fn cancel_timer(&self) {
        if let Some(handle) = lock(&self.inner.timer).take() {
            handle.abort();
            debug!("Refresh timer cancelled");
        }
    }
}

/// Timer body; holds only a weak reference so it never keeps a manager alive
fn refresh_after(inner: Weak<Inner>, wait: Duration) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        tokio::time::sleep(wait).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        SessionManager { inner }.run_refresh(true).await;
    })
}
