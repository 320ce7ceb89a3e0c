//! Session manager integration tests
//!
//! Timer tests run on paused tokio time; session expiry is measured against
//! a manual clock that stays put unless a test moves it.

use smartpro::testing::{session_for, FakeAuthProvider};
use smartpro::{AuthError, SessionConfig, SessionManager, SessionStatus, User};
use smartpro_cache::{CacheManager, Clock, ManualClock, MemoryStorage, NullBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn setup(auth: &Arc<FakeAuthProvider>, clock: &ManualClock) -> SessionManager {
    let cache = CacheManager::builder()
        .backend(Arc::new(NullBackend))
        .local_storage(Arc::new(MemoryStorage::new()))
        .clock(Arc::new(clock.clone()))
        .build();
    SessionManager::new(auth.clone(), cache, SessionConfig::default())
}

fn signed_in(clock: &ManualClock, expires_in: i64) -> Arc<FakeAuthProvider> {
    Arc::new(FakeAuthProvider::with_session_expiring_at(
        User::new("u1"),
        clock.now_secs() + expires_in,
    ))
}

#[tokio::test(start_paused = true)]
async fn test_checks_within_freshness_window_call_auth_once() {
    let clock = ManualClock::starting_now();
    let auth = signed_in(&clock, 3600);
    let sessions = setup(&auth, &clock);

    let first = sessions.check_session().await;
    clock.advance(Duration::from_secs(30));
    let second = sessions.check_session().await;

    assert_eq!(auth.get_session_calls(), 1);
    assert_eq!(first, second);

    clock.advance(Duration::from_secs(30));
    sessions.check_session().await;
    assert_eq!(auth.get_session_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_fires_five_minutes_before_expiry() {
    let clock = ManualClock::starting_now();
    let auth = signed_in(&clock, 1000);
    let sessions = setup(&auth, &clock);

    assert!(sessions.check_session().await.is_authenticated());
    assert!(sessions.is_refresh_scheduled());

    sleep(Duration::from_secs(699)).await;
    assert_eq!(auth.refresh_calls(), 0);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(auth.refresh_calls(), 1);
    // Re-armed for the refreshed session
    assert!(sessions.is_refresh_scheduled());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_runs_immediately_inside_lead_window() {
    let clock = ManualClock::starting_now();
    let auth = signed_in(&clock, 200);
    let sessions = setup(&auth, &clock);

    sessions.check_session().await;
    sleep(Duration::from_millis(1)).await;
    assert_eq!(auth.refresh_calls(), 1);

    // Still inside the window after refreshing: the next attempt waits
    sleep(Duration::from_secs(29)).await;
    assert_eq!(auth.refresh_calls(), 1);
    sleep(Duration::from_secs(2)).await;
    assert_eq!(auth.refresh_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_schedule_is_single_flight() {
    let clock = ManualClock::starting_now();
    let auth = signed_in(&clock, 1000);
    let sessions = setup(&auth, &clock);

    let expires_at = Some(clock.now_secs() + 1000);
    sessions.schedule_refresh(expires_at).await;
    sessions.schedule_refresh(expires_at).await;
    sessions.schedule_refresh(expires_at).await;

    sleep(Duration::from_secs(701)).await;
    assert_eq!(auth.refresh_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_schedule_without_expiry_is_noop() {
    let clock = ManualClock::starting_now();
    let auth = signed_in(&clock, 1000);
    let sessions = setup(&auth, &clock);

    sessions.schedule_refresh(None).await;
    assert!(!sessions.is_refresh_scheduled());
}

#[tokio::test(start_paused = true)]
async fn test_manual_refresh_replaces_armed_timer() {
    let clock = ManualClock::starting_now();
    let auth = signed_in(&clock, 1000);
    let sessions = setup(&auth, &clock);

    sessions.check_session().await;
    sleep(Duration::from_secs(100)).await;

    let info = sessions.refresh_session().await;
    assert!(info.is_authenticated());
    assert_eq!(auth.refresh_calls(), 1);

    // The first timer (due at 700s) was cancelled; the new one is due at 800s
    sleep(Duration::from_secs(601)).await;
    assert_eq!(auth.refresh_calls(), 1);
    sleep(Duration::from_secs(100)).await;
    assert_eq!(auth.refresh_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_without_session_signs_out() {
    let clock = ManualClock::starting_now();
    let auth = signed_in(&clock, 1000);
    let sessions = setup(&auth, &clock);
    sessions.check_session().await;

    auth.set_session(None);
    let info = sessions.refresh_session().await;

    assert_eq!(info.status, SessionStatus::Unauthenticated);
    assert_eq!(auth.refresh_calls(), 0);
    assert!(sessions.current_user().await.is_none());
    assert!(!sessions.is_refresh_scheduled());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_returning_expired_session() {
    let clock = ManualClock::starting_now();
    let auth = signed_in(&clock, 1000);
    let sessions = setup(&auth, &clock);

    auth.set_refresh_result(Ok(Some(session_for(User::new("u1"), clock.now_secs() - 1))));
    let info = sessions.refresh_session().await;

    assert_eq!(info.status, SessionStatus::Unauthenticated);
    assert_eq!(info.error.as_deref(), Some("Session expired"));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_error_is_error_status() {
    let clock = ManualClock::starting_now();
    let auth = signed_in(&clock, 1000);
    let sessions = setup(&auth, &clock);

    auth.set_refresh_result(Err(AuthError::Network("connection reset".into())));
    let info = sessions.refresh_session().await;

    assert_eq!(info.status, SessionStatus::Error);
    // Network failures are retried up to the refresh attempt limit
    assert_eq!(auth.refresh_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_transient_get_session_failure_is_retried() {
    let clock = ManualClock::starting_now();
    let auth = signed_in(&clock, 3600);
    let sessions = setup(&auth, &clock);

    auth.fail_next(AuthError::Timeout);
    let info = sessions.check_session().await;

    assert!(info.is_authenticated());
    assert_eq!(auth.get_session_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_no_session_error_is_terminal() {
    let clock = ManualClock::starting_now();
    let auth = signed_in(&clock, 3600);
    let sessions = setup(&auth, &clock);

    auth.fail_next(AuthError::NoSession);
    let info = sessions.check_session().await;

    assert_eq!(info.status, SessionStatus::Unauthenticated);
    assert_eq!(auth.get_session_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_user_is_published_without_any_cache() {
    let clock = ManualClock::starting_now();
    let auth = signed_in(&clock, 3600);
    let cache = CacheManager::builder()
        .backend(Arc::new(NullBackend))
        .clock(Arc::new(clock.clone()))
        .build();
    let sessions = SessionManager::new(auth.clone(), cache, SessionConfig::default());

    assert!(sessions.check_session().await.is_authenticated());
    assert_eq!(sessions.auth_context().user.map(|u| u.id), Some("u1".to_string()));
    assert_eq!(sessions.current_user().await.map(|u| u.id), Some("u1".to_string()));

    // The fresh snapshot is reused from memory and still carries the user
    clock.advance(Duration::from_secs(10));
    sessions.check_session().await;
    assert_eq!(auth.get_session_calls(), 1);
    assert!(sessions.auth_context().user.is_some());

    sessions.sign_out().await.unwrap();
    assert!(sessions.auth_context().user.is_none());
    assert!(sessions.current_user().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_subscribers_see_auth_context() {
    let clock = ManualClock::starting_now();
    let auth = signed_in(&clock, 3600);
    let sessions = setup(&auth, &clock);

    let mut rx = sessions.subscribe();
    assert!(rx.borrow().is_pending());

    sessions.check_session().await;
    assert!(rx.has_changed().unwrap());
    let ctx = rx.borrow_and_update().clone();
    assert!(ctx.initialized);
    assert_eq!(ctx.user.map(|u| u.id), Some("u1".to_string()));

    sessions.sign_out().await.unwrap();
    assert!(rx.borrow_and_update().user.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_timer() {
    let clock = ManualClock::starting_now();
    let auth = signed_in(&clock, 1000);
    let sessions = setup(&auth, &clock);

    sessions.check_session().await;
    sessions.shutdown().await;

    sleep(Duration::from_secs(1000)).await;
    assert_eq!(auth.refresh_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_manager_cancels_timer() {
    let clock = ManualClock::starting_now();
    let auth = signed_in(&clock, 1000);

    {
        let sessions = setup(&auth, &clock);
        sessions.check_session().await;
    }

    sleep(Duration::from_secs(1000)).await;
    assert_eq!(auth.refresh_calls(), 0);
}
