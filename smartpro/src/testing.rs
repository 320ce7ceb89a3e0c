//! In-process fakes for the external collaborators
//!
//! Used by this crate's tests and available to downstream tests. None of
//! these talk to a network.

use crate::auth::{AuthProvider, ProfileStore, Role, Session, User};
use crate::error::{AuthError, ProfileError};
use crate::role::Navigator;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Build a session for `user` that expires at `expires_at` (epoch seconds)
pub fn session_for(user: User, expires_at: i64) -> Session {
    Session {
        access_token: format!("access-{}", user.id),
        refresh_token: Some(format!("refresh-{}", user.id)),
        expires_at: Some(expires_at),
        user,
    }
}

#[derive(Default)]
struct FakeAuthState {
    session: Option<Session>,
    /// Returned (once each) before any other `get_session` result
    queued_failures: VecDeque<AuthError>,
    /// Returned by every `get_session` call while set
    failure: Option<AuthError>,
    refresh: Option<Result<Option<Session>, AuthError>>,
    tokens: HashMap<String, User>,
}

/// Scriptable [`AuthProvider`] that counts its calls
#[derive(Default)]
pub struct FakeAuthProvider {
    state: Mutex<FakeAuthState>,
    get_session_calls: AtomicUsize,
    get_user_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
}

impl FakeAuthProvider {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        let fake = Self::default();
        fake.set_session(Some(session));
        fake
    }

    pub fn with_session_expiring_at(user: User, expires_at: i64) -> Self {
        Self::with_session(session_for(user, expires_at))
    }

    /// Every `get_session` call fails with `error`
    pub fn failing(error: AuthError) -> Self {
        let fake = Self::default();
        lock(&fake.state).failure = Some(error);
        fake
    }

    /// Accept `token` in `get_user` as belonging to `user`
    pub fn with_token(self, token: impl Into<String>, user: User) -> Self {
        lock(&self.state).tokens.insert(token.into(), user);
        self
    }

    pub fn set_session(&self, session: Option<Session>) {
        lock(&self.state).session = session;
    }

    /// Fail the next `get_session` call with `error`, then behave normally
    pub fn fail_next(&self, error: AuthError) {
        lock(&self.state).queued_failures.push_back(error);
    }

    /// Result returned by every `refresh_session` call
    ///
    /// Without one, a refresh hands back the current session unchanged.
    pub fn set_refresh_result(&self, result: Result<Option<Session>, AuthError>) {
        lock(&self.state).refresh = Some(result);
    }

    pub fn get_session_calls(&self) -> usize {
        self.get_session_calls.load(Ordering::SeqCst)
    }

    pub fn get_user_calls(&self) -> usize {
        self.get_user_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for FakeAuthProvider {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        self.get_session_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = lock(&self.state);
        if let Some(error) = state.queued_failures.pop_front() {
            return Err(error);
        }
        if let Some(error) = &state.failure {
            return Err(error.clone());
        }
        Ok(state.session.clone())
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<User>, AuthError> {
        self.get_user_calls.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.state).tokens.get(access_token).cloned())
    }

    async fn refresh_session(&self) -> Result<Option<Session>, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = lock(&self.state);
        match state.refresh.clone() {
            Some(Ok(session)) => {
                state.session = session.clone();
                Ok(session)
            }
            Some(Err(error)) => Err(error),
            None => match &state.session {
                Some(session) => Ok(Some(session.clone())),
                None => Err(AuthError::NoSession),
            },
        }
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.state).session = None;
        Ok(())
    }
}

/// [`ProfileStore`] over a fixed map of roles
#[derive(Default)]
pub struct StaticProfileStore {
    roles: Mutex<HashMap<String, Role>>,
    calls: AtomicUsize,
}

impl StaticProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(self, user_id: impl Into<String>, role: Role) -> Self {
        self.set_role(user_id, role);
        self
    }

    pub fn set_role(&self, user_id: impl Into<String>, role: Role) {
        lock(&self.roles).insert(user_id.into(), role);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileStore for StaticProfileStore {
    async fn get_role(&self, user_id: &str) -> Result<Option<Role>, ProfileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.roles).get(user_id).cloned())
    }
}

/// [`ProfileStore`] that fails a set number of times, then answers
pub struct FlakyProfileStore {
    failures_left: AtomicU32,
    error: ProfileError,
    role: Option<Role>,
    calls: AtomicUsize,
}

impl FlakyProfileStore {
    pub fn new(failures: u32, error: ProfileError, role: Option<Role>) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            error,
            role,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileStore for FlakyProfileStore {
    async fn get_role(&self, _user_id: &str) -> Result<Option<Role>, ProfileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(self.error.clone())
        } else {
            Ok(self.role.clone())
        }
    }
}

/// [`ProfileStore`] whose queries never complete
#[derive(Debug, Default)]
pub struct PendingProfileStore;

#[async_trait]
impl ProfileStore for PendingProfileStore {
    async fn get_role(&self, _user_id: &str) -> Result<Option<Role>, ProfileError> {
        futures::future::pending().await
    }
}

/// [`Navigator`] that records every path it is sent to
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    paths: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> Vec<String> {
        lock(&self.paths).clone()
    }

    pub fn last(&self) -> Option<String> {
        lock(&self.paths).last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        lock(&self.paths).push(path.to_string());
    }
}
