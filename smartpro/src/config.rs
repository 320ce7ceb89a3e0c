//! Application configuration
//!
//! Everything is read once at startup. Missing cache or auth settings are not
//! errors: the application degrades to local storage or the dev bypass.

use crate::auth::Role;
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use smartpro_cache::RemoteCacheConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Set when both are present
pub const ENV_AUTH_URL: &str = "SUPABASE_URL";
pub const ENV_AUTH_KEY: &str = "SUPABASE_ANON_KEY";
pub const ENV_DEV_MODE: &str = "SMARTPRO_DEV_MODE";
pub const ENV_LOCAL_STORAGE: &str = "SMARTPRO_LOCAL_STORAGE";

/// Session manager timings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long a cached session check is reused
    pub freshness: Duration,
    /// Refresh this long before the session expires
    pub refresh_lead: Duration,
    /// TTL of the cached user payload
    pub user_ttl: Duration,
    pub get_session_retry: RetryPolicy,
    pub refresh_retry: RetryPolicy,
    /// Lower bound on the wait when a refresh re-arms inside the lead window
    pub min_rearm_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            freshness: Duration::from_secs(60),
            refresh_lead: Duration::from_secs(5 * 60),
            user_ttl: Duration::from_secs(60 * 60),
            get_session_retry: RetryPolicy::new(2, Duration::from_millis(200)),
            refresh_retry: RetryPolicy::new(3, Duration::from_millis(200)),
            min_rearm_delay: Duration::from_secs(30),
        }
    }
}

impl SessionConfig {
    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn with_refresh_lead(mut self, lead: Duration) -> Self {
        self.refresh_lead = lead;
        self
    }

    pub fn with_user_ttl(mut self, ttl: Duration) -> Self {
        self.user_ttl = ttl;
        self
    }

    pub fn with_get_session_retry(mut self, policy: RetryPolicy) -> Self {
        self.get_session_retry = policy;
        self
    }

    pub fn with_refresh_retry(mut self, policy: RetryPolicy) -> Self {
        self.refresh_retry = policy;
        self
    }

    pub fn with_min_rearm_delay(mut self, delay: Duration) -> Self {
        self.min_rearm_delay = delay;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.get_session_retry.attempts == 0 || self.refresh_retry.attempts == 0 {
            return Err(Error::Config("session retry attempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Role gate settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAuthConfig {
    /// TTL of cached `user_role_<id>` entries
    pub role_ttl: Duration,
    pub retry: RetryPolicy,
    /// Wall-clock ceiling on role resolution
    pub safety_timeout: Duration,
    /// Role used when none can be resolved
    pub default_role: Role,
    /// False when the auth service is not configured at all
    pub auth_configured: bool,
    /// Skip role resolution entirely
    pub dev_mode: bool,
}

impl Default for RoleAuthConfig {
    fn default() -> Self {
        Self {
            role_ttl: Duration::from_secs(15 * 60),
            retry: RetryPolicy::new(2, Duration::from_millis(200)),
            safety_timeout: Duration::from_secs(3),
            default_role: Role::Client,
            auth_configured: true,
            dev_mode: false,
        }
    }
}

impl RoleAuthConfig {
    pub fn with_role_ttl(mut self, ttl: Duration) -> Self {
        self.role_ttl = ttl;
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn with_safety_timeout(mut self, timeout: Duration) -> Self {
        self.safety_timeout = timeout;
        self
    }

    pub fn with_default_role(mut self, role: Role) -> Self {
        self.default_role = role;
        self
    }

    pub fn with_auth_configured(mut self, configured: bool) -> Self {
        self.auth_configured = configured;
        self
    }

    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    /// Whether role resolution is skipped and everyone is a default-role user
    pub fn bypass(&self) -> bool {
        !self.auth_configured || self.dev_mode
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.attempts == 0 {
            return Err(Error::Config("role retry attempts must be at least 1".into()));
        }
        if self.safety_timeout.is_zero() {
            return Err(Error::Config("role safety timeout must be positive".into()));
        }
        Ok(())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// `None` selects the null backend
    pub remote_cache: Option<RemoteCacheConfig>,
    /// `None` disables the local fallback
    pub local_storage_path: Option<PathBuf>,
    pub session: SessionConfig,
    pub role: RoleAuthConfig,
}

impl AppConfig {
    /// Read configuration from the process environment and `.env`
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let auth_configured = var(ENV_AUTH_URL).is_some() && var(ENV_AUTH_KEY).is_some();
        let dev_mode = var(ENV_DEV_MODE)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1"))
            .unwrap_or(false);

        let local_storage_path = var(ENV_LOCAL_STORAGE)
            .map(PathBuf::from)
            .or_else(|| smartpro_cache::FileStorage::default_path().ok());

        Self {
            remote_cache: RemoteCacheConfig::from_lookup(&var),
            local_storage_path,
            session: SessionConfig::default(),
            role: RoleAuthConfig::default()
                .with_auth_configured(auth_configured)
                .with_dev_mode(dev_mode),
        }
    }

    pub fn with_remote_cache(mut self, config: Option<RemoteCacheConfig>) -> Self {
        self.remote_cache = config;
        self
    }

    pub fn with_local_storage_path(mut self, path: Option<PathBuf>) -> Self {
        self.local_storage_path = path;
        self
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn with_role(mut self, role: RoleAuthConfig) -> Self {
        self.role = role;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        self.role.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let session = SessionConfig::default();
        assert_eq!(session.freshness, Duration::from_secs(60));
        assert_eq!(session.refresh_lead, Duration::from_secs(300));
        assert_eq!(session.get_session_retry.attempts, 2);
        assert_eq!(session.refresh_retry.attempts, 3);

        let role = RoleAuthConfig::default();
        assert_eq!(role.role_ttl, Duration::from_secs(900));
        assert_eq!(role.safety_timeout, Duration::from_secs(3));
        assert_eq!(role.default_role, Role::Client);
        assert!(!role.bypass());
    }

    #[test]
    fn test_from_lookup_reads_auth_and_cache() {
        let config = AppConfig::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://auth.example.com"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("KV_REST_API_URL", "https://kv.example.com"),
            ("KV_REST_API_TOKEN", "secret"),
            ("SMARTPRO_LOCAL_STORAGE", "/tmp/smartpro.json"),
        ]));

        assert!(config.role.auth_configured);
        assert!(!config.role.dev_mode);
        let remote = config.remote_cache.unwrap();
        assert_eq!(remote.url, "https://kv.example.com");
        assert_eq!(config.local_storage_path, Some(PathBuf::from("/tmp/smartpro.json")));
    }

    #[test]
    fn test_missing_auth_enables_bypass() {
        let config = AppConfig::from_lookup(lookup(&[("SUPABASE_URL", "https://auth.example.com")]));
        assert!(!config.role.auth_configured);
        assert!(config.role.bypass());
        assert!(config.remote_cache.is_none());
    }

    #[test]
    fn test_dev_mode_flag() {
        for (value, expected) in [("true", true), ("1", true), ("TRUE", true), ("no", false)] {
            let config = AppConfig::from_lookup(lookup(&[("SMARTPRO_DEV_MODE", value)]));
            assert_eq!(config.role.dev_mode, expected, "value={}", value);
        }
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = AppConfig::default()
            .with_role(RoleAuthConfig::default().with_retry(RetryPolicy::new(0, Duration::ZERO)));
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        assert!(AppConfig::default().validate().is_ok());
    }
}
