//! Profile store boundary and the role model

use crate::error::ProfileError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// A user's role
///
/// Unknown role strings are kept verbatim rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Provider,
    #[default]
    Client,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::Provider => "provider",
            Role::Client => "client",
            Role::Other(role) => role,
        }
    }

    /// Landing page for this role
    pub fn dashboard_path(&self) -> &'static str {
        match self {
            Role::Admin => "/admin/dashboard",
            Role::Provider => "/provider/dashboard",
            Role::Client => "/client/dashboard",
            Role::Other(_) => "/dashboard",
        }
    }
}

impl From<String> for Role {
    fn from(role: String) -> Self {
        match role.as_str() {
            "admin" => Role::Admin,
            "provider" => Role::Provider,
            "client" => Role::Client,
            _ => Role::Other(role),
        }
    }
}

impl From<&str> for Role {
    fn from(role: &str) -> Self {
        Role::from(role.to_string())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(role) => role,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for Role {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Role::from(s))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where user roles are stored
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Role recorded for `user_id`, `Ok(None)` when the profile has none
    async fn get_role(&self, user_id: &str) -> Result<Option<Role>, ProfileError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing_keeps_unknown_roles() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(Role::from("auditor"), Role::Other("auditor".into()));
        assert_eq!(Role::Other("auditor".into()).as_str(), "auditor");
    }

    #[test]
    fn test_role_serializes_as_plain_string() {
        assert_eq!(serde_json::to_string(&Role::Provider).unwrap(), "\"provider\"");
        let role: Role = serde_json::from_str("\"staff\"").unwrap();
        assert_eq!(role, Role::Other("staff".into()));
    }

    #[test]
    fn test_dashboard_paths() {
        assert_eq!(Role::Admin.dashboard_path(), "/admin/dashboard");
        assert_eq!(Role::Provider.dashboard_path(), "/provider/dashboard");
        assert_eq!(Role::Client.dashboard_path(), "/client/dashboard");
        assert_eq!(Role::from("staff").dashboard_path(), "/dashboard");
    }

    #[test]
    fn test_default_role_is_client() {
        assert_eq!(Role::default(), Role::Client);
    }
}
