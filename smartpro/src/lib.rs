//! # SmartPRO core
//!
//! Session memoization, proactive session refresh and role-based access
//! for the SmartPRO application, on top of [`smartpro_cache`].
//!
//! ```no_run
//! use smartpro::{AppConfig, AppContext, RoleGuard, RoleGuardOptions, Role};
//! # use std::sync::Arc;
//! # async fn example(
//! #     auth: Arc<dyn smartpro::AuthProvider>,
//! #     profiles: Arc<dyn smartpro::ProfileStore>,
//! #     navigator: Arc<dyn smartpro::Navigator>,
//! # ) -> anyhow::Result<()> {
//! smartpro::telemetry::init_tracing();
//!
//! let ctx = AppContext::new(AppConfig::from_env(), auth, profiles)?;
//! ctx.sessions.check_session().await;
//!
//! let guard = RoleGuard::mount(
//!     ctx.roles.clone(),
//!     ctx.sessions.subscribe(),
//!     RoleGuardOptions::new([Role::Admin]).with_current_path("/admin/users"),
//!     navigator,
//! );
//! let state = guard.wait_until_loaded().await;
//! println!("authorized: {}", state.is_authorized);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod retry;
pub mod role;
pub mod session;
pub mod telemetry;
pub mod testing;

pub use auth::{AuthContext, AuthProvider, ProfileStore, Role, Session, User};
pub use config::{AppConfig, RoleAuthConfig, SessionConfig};
pub use context::AppContext;
pub use error::{AuthError, Error, ProfileError, Result, Retryable};
pub use retry::RetryPolicy;
pub use role::{
    dashboard_path, login_redirect, Navigator, RoleAuthState, RoleAuthorizer, RoleGuard,
    RoleGuardOptions,
};
pub use session::{SessionInfo, SessionManager, SessionStatus};
