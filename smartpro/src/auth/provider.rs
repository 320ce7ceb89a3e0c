//! Authentication service boundary

use crate::error::AuthError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// User payload returned by the auth service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Free-form metadata attached by the auth service
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// An authenticated session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiry as epoch seconds
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

/// Auth snapshot published to consumers such as the role gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub loading: bool,
    pub initialized: bool,
    pub user: Option<User>,
}

impl Default for AuthContext {
    fn default() -> Self {
        Self {
            loading: true,
            initialized: false,
            user: None,
        }
    }
}

impl AuthContext {
    /// A settled context with or without a user
    pub fn resolved(user: Option<User>) -> Self {
        Self {
            loading: false,
            initialized: true,
            user,
        }
    }

    /// Still waiting for the first session check
    pub fn is_pending(&self) -> bool {
        self.loading && !self.initialized
    }
}

/// The hosted authentication service
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Current session, `Ok(None)` when signed out
    async fn get_session(&self) -> Result<Option<Session>, AuthError>;

    /// Resolve the user behind an access token
    async fn get_user(&self, access_token: &str) -> Result<Option<User>, AuthError>;

    /// Exchange the refresh token for a new session
    async fn refresh_session(&self) -> Result<Option<Session>, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_context_starts_pending() {
        let ctx = AuthContext::default();
        assert!(ctx.is_pending());
        assert!(!AuthContext::resolved(None).is_pending());
    }

    #[test]
    fn test_user_deserializes_without_optional_fields() {
        let user: User = serde_json::from_str(r#"{"id":"u1"}"#).unwrap();
        assert_eq!(user, User::new("u1"));
    }
}
