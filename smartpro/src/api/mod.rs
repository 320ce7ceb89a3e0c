//! HTTP route guards
//!
//! Axum middleware that applies the role gate to server-rendered routes.

pub mod middleware;

pub use middleware::{auth_middleware, current_user, require_roles, AuthState, CurrentUser, RouteGuard};
