//! Authentication and role middleware for Axum

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::{AuthProvider, Role, User};
use crate::error::Retryable;
use crate::role::{dashboard_path, login_redirect, RoleAuthorizer, LOGIN_PATH};

/// Authentication state shared across requests
#[derive(Clone)]
pub struct AuthState {
    pub auth: Arc<dyn AuthProvider>,
}

impl AuthState {
    pub fn new(auth: Arc<dyn AuthProvider>) -> Self {
        Self { auth }
    }
}

/// The signed-in user, stored in request extensions by [`auth_middleware`]
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Extract the token from an `Authorization: Bearer <token>` value
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    let token = auth_header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Authentication middleware that resolves the bearer token to a user
///
/// Requests without a usable token continue anonymously; route guards
/// decide what anonymous callers may see. A transient auth-service failure
/// answers `503`.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer_token)
        .map(str::to_string);

    if let Some(token) = token {
        match state.auth.get_user(&token).await {
            Ok(Some(user)) => {
                debug!(user_id = %user.id, "Request authenticated");
                request.extensions_mut().insert(CurrentUser(user));
            }
            Ok(None) => debug!("Bearer token did not resolve to a user"),
            Err(e) if e.is_retryable() => {
                warn!("Auth service unavailable: {}", e);
                return Err(StatusCode::SERVICE_UNAVAILABLE);
            }
            Err(e) => debug!("Bearer token rejected: {}", e),
        }
    }

    Ok(next.run(request).await)
}

/// Extract the user from request extensions (set by auth middleware)
pub fn current_user(request: &Request) -> Option<User> {
    request.extensions().get::<CurrentUser>().map(|u| u.0.clone())
}

/// Route-level role gate state
#[derive(Clone)]
pub struct RouteGuard {
    authorizer: RoleAuthorizer,
    allowed_roles: Arc<Vec<Role>>,
    redirect_to: String,
}

impl RouteGuard {
    pub fn new(authorizer: RoleAuthorizer, allowed_roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            authorizer,
            allowed_roles: Arc::new(allowed_roles.into_iter().collect()),
            redirect_to: LOGIN_PATH.to_string(),
        }
    }

    pub fn with_redirect_to(mut self, redirect_to: impl Into<String>) -> Self {
        self.redirect_to = redirect_to.into();
        self
    }
}

fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// Role middleware: `302` to login without a user, `302` to the user's own
/// dashboard when their role is not allowed
///
/// On success the resolved [`Role`] is added to request extensions.
pub async fn require_roles(State(guard): State<RouteGuard>, mut request: Request, next: Next) -> Response {
    let config = guard.authorizer.config();
    if config.bypass() {
        request.extensions_mut().insert(config.default_role.clone());
        return next.run(request).await;
    }

    let Some(user) = current_user(&request) else {
        let path = request
            .uri()
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/");
        return found(&login_redirect(&guard.redirect_to, path));
    };

    let role = guard.authorizer.resolve_within_timeout(&user.id).await;
    if !guard.allowed_roles.contains(&role) {
        debug!(user_id = %user.id, role = %role, path = %request.uri().path(), "Role not allowed");
        return found(dashboard_path(&role));
    }

    request.extensions_mut().insert(role);
    next.run(request).await
}
