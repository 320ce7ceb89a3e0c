//! Adapter for the hosted REST key-value service
//!
//! The service speaks Redis commands over HTTP: every command is a `POST` to
//! the base URL with a JSON array body such as `["SET","k","v","EX","60"]`
//! and a bearer token. Replies are `{"result": ...}` or `{"error": "..."}`.
//!
//! The remote cache is optional infrastructure. Every typed operation on
//! [`RemoteCache`] catches its own failures, logs them and returns a safe
//! default (`false`, `None`, `0`, `[]`) so callers can fall back to local
//! storage instead of crashing.
//!
//! ```no_run
//! use smartpro_cache::RemoteCache;
//!
//! # async fn example() {
//! let remote = RemoteCache::from_env();
//! if remote.is_available().await {
//!     remote.set("greeting", &"hello", None).await;
//!     let value: Option<String> = remote.get("greeting").await;
//!     println!("{:?}", value);
//! }
//! # }
//! ```

use crate::error::{CacheError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Primary environment variables for the REST endpoint
pub const ENV_URL: &str = "KV_REST_API_URL";
pub const ENV_TOKEN: &str = "KV_REST_API_TOKEN";

/// Alternative names used by some hosting providers
pub const ENV_URL_ALT: &str = "UPSTASH_REDIS_REST_URL";
pub const ENV_TOKEN_ALT: &str = "UPSTASH_REDIS_REST_TOKEN";

/// Connection settings for the REST key-value service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCacheConfig {
    /// Base URL of the REST endpoint
    pub url: String,
    /// Bearer token
    pub token: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl RemoteCacheConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            request_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Resolve credentials from the process environment (and `.env`, if present)
    pub fn from_env() -> Option<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve credentials through an arbitrary lookup function
    ///
    /// The primary pair wins; the alternative pair is only consulted when
    /// the primary pair is incomplete. Blank values count as absent.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        match (get(ENV_URL), get(ENV_TOKEN)) {
            (Some(url), Some(token)) => Some(Self::new(url, token)),
            _ => match (get(ENV_URL_ALT), get(ENV_TOKEN_ALT)) {
                (Some(url), Some(token)) => Some(Self::new(url, token)),
                _ => None,
            },
        }
    }
}

/// Body of every reply from the REST endpoint
#[derive(Debug, Deserialize)]
struct RestReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// A configured HTTP connection to the REST endpoint
#[derive(Debug)]
pub struct RestClient {
    http: reqwest::Client,
    url: String,
    token: String,
}

impl RestClient {
    /// Build a client from connection settings
    pub fn connect(config: &RemoteCacheConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Send one command and return its `result`
    pub async fn command(&self, args: &[String]) -> Result<Value> {
        let name = args.first().map(String::as_str).unwrap_or_default();
        debug!(command = %name, "Sending remote cache command");

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(args)
            .send()
            .await?;

        let status = response.status();
        let reply: RestReply = match response.json().await {
            Ok(reply) => reply,
            Err(e) if !status.is_success() => {
                return Err(CacheError::Remote(format!("HTTP {}: {}", status, e)))
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(error) = reply.error {
            return Err(CacheError::Remote(error));
        }
        if !status.is_success() {
            return Err(CacheError::Remote(format!("HTTP {}", status)));
        }

        Ok(reply.result.unwrap_or(Value::Null))
    }
}

/// Lazy client state
enum ClientState {
    Uninitialized,
    Ready(Arc<RestClient>),
    Unconfigured,
}

/// Defensive adapter over the REST key-value service
///
/// The underlying client is created on first use and at most once until
/// [`reset_client`](Self::reset_client) is called. Construct one of these at
/// application start and share it; it replaces a process-global singleton.
pub struct RemoteCache {
    config: Option<RemoteCacheConfig>,
    client: RwLock<ClientState>,
}

impl RemoteCache {
    /// Create an adapter with explicit connection settings
    pub fn new(config: RemoteCacheConfig) -> Self {
        Self {
            config: Some(config),
            client: RwLock::new(ClientState::Uninitialized),
        }
    }

    /// Create an adapter that resolves its settings from the environment on first use
    pub fn from_env() -> Self {
        Self {
            config: None,
            client: RwLock::new(ClientState::Uninitialized),
        }
    }

    /// Create an adapter from optional settings, falling back to the environment
    pub fn with_options(config: Option<RemoteCacheConfig>) -> Self {
        match config {
            Some(config) => Self::new(config),
            None => Self::from_env(),
        }
    }

    /// Get the client, initializing it on first call
    ///
    /// Returns `None` when no credentials could be found or the client
    /// could not be built. That outcome is remembered until reset.
    pub async fn get_client(&self) -> Option<Arc<RestClient>> {
        {
            let state = self.client.read().await;
            match &*state {
                ClientState::Ready(client) => return Some(Arc::clone(client)),
                ClientState::Unconfigured => return None,
                ClientState::Uninitialized => {}
            }
        }

        let mut state = self.client.write().await;
        // Another caller may have won the race for the write lock
        match &*state {
            ClientState::Ready(client) => return Some(Arc::clone(client)),
            ClientState::Unconfigured => return None,
            ClientState::Uninitialized => {}
        }

        let config = self.config.clone().or_else(RemoteCacheConfig::from_env);
        let Some(config) = config else {
            info!("Remote cache credentials not found, remote cache disabled");
            *state = ClientState::Unconfigured;
            return None;
        };

        match RestClient::connect(&config) {
            Ok(client) => {
                info!(url = %config.url, "Remote cache client initialized");
                let client = Arc::new(client);
                *state = ClientState::Ready(Arc::clone(&client));
                Some(client)
            }
            Err(e) => {
                warn!("Failed to build remote cache client: {}", e);
                *state = ClientState::Unconfigured;
                None
            }
        }
    }

    /// Drop the client so the next call re-initializes it
    pub async fn reset_client(&self) {
        *self.client.write().await = ClientState::Uninitialized;
        debug!("Remote cache client reset");
    }

    /// Whether a client exists and answers `PING`
    pub async fn is_available(&self) -> bool {
        let Some(client) = self.get_client().await else {
            return false;
        };

        match client.command(&args(["PING"])).await {
            Ok(Value::String(s)) if s.eq_ignore_ascii_case("PONG") => true,
            Ok(other) => {
                warn!("Unexpected PING reply from remote cache: {}", other);
                false
            }
            Err(e) => {
                warn!("Remote cache unavailable: {}", e);
                false
            }
        }
    }

    /// Store a JSON-encoded value, optionally with a TTL
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        self.run("SET", key, false, |client| async move {
            let encoded = serde_json::to_string(value)?;
            let mut cmd = args(["SET", key]);
            cmd.push(encoded);
            if let Some(ttl) = ttl {
                cmd.push("EX".to_string());
                cmd.push(ttl.as_secs().max(1).to_string());
            }
            let reply = client.command(&cmd).await?;
            Ok(reply.as_str() == Some("OK"))
        })
        .await
    }

    /// Fetch and decode a value
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.run("GET", key, None, |client| async move {
            match client.command(&args(["GET", key])).await? {
                Value::Null => Ok(None),
                reply => Ok(Some(decode(reply)?)),
            }
        })
        .await
    }

    /// Delete a key; deleting a missing key still succeeds
    pub async fn del(&self, key: &str) -> bool {
        self.run("DEL", key, false, |client| async move {
            let reply = client.command(&args(["DEL", key])).await?;
            expect_integer("DEL", &reply)?;
            Ok(true)
        })
        .await
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.run("EXISTS", key, false, |client| async move {
            let reply = client.command(&args(["EXISTS", key])).await?;
            Ok(expect_integer("EXISTS", &reply)? > 0)
        })
        .await
    }

    /// Set a TTL on an existing key
    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        self.run("EXPIRE", key, false, |client| async move {
            let mut cmd = args(["EXPIRE", key]);
            cmd.push(ttl.as_secs().max(1).to_string());
            let reply = client.command(&cmd).await?;
            Ok(expect_integer("EXPIRE", &reply)? == 1)
        })
        .await
    }

    /// Increment a counter, returning the new value (0 on failure)
    pub async fn incr(&self, key: &str) -> i64 {
        self.run("INCR", key, 0, |client| async move {
            let reply = client.command(&args(["INCR", key])).await?;
            expect_integer("INCR", &reply)
        })
        .await
    }

    /// Push JSON-encoded values onto the head of a list, returning its new length
    pub async fn list_push<T: Serialize>(&self, key: &str, values: &[T]) -> i64 {
        if values.is_empty() {
            return 0;
        }

        self.run("LPUSH", key, 0, |client| async move {
            let mut cmd = args(["LPUSH", key]);
            for value in values {
                cmd.push(serde_json::to_string(value)?);
            }
            let reply = client.command(&cmd).await?;
            expect_integer("LPUSH", &reply)
        })
        .await
    }

    /// Read and decode a slice of a list (inclusive bounds, negatives count from the end)
    pub async fn list_range<T: DeserializeOwned>(&self, key: &str, start: i64, stop: i64) -> Vec<T> {
        self.run("LRANGE", key, Vec::new(), |client| async move {
            let mut cmd = args(["LRANGE", key]);
            cmd.push(start.to_string());
            cmd.push(stop.to_string());

            match client.command(&cmd).await? {
                Value::Array(items) => items.into_iter().map(decode).collect(),
                Value::Null => Ok(Vec::new()),
                other => Err(unexpected("LRANGE", &other)),
            }
        })
        .await
    }

    /// Publish a JSON-encoded message, returning the number of receivers
    pub async fn publish<T: Serialize + ?Sized>(&self, channel: &str, message: &T) -> i64 {
        self.run("PUBLISH", channel, 0, |client| async move {
            let mut cmd = args(["PUBLISH", channel]);
            cmd.push(serde_json::to_string(message)?);
            let reply = client.command(&cmd).await?;
            expect_integer("PUBLISH", &reply)
        })
        .await
    }

    /// List keys starting with `prefix` by walking `SCAN` to completion
    pub async fn scan_keys(&self, prefix: &str) -> Vec<String> {
        self.run("SCAN", prefix, Vec::new(), |client| async move {
            let pattern = format!("{}*", escape_glob(prefix));
            let mut cursor = "0".to_string();
            let mut keys = Vec::new();

            loop {
                let cmd = args(["SCAN", &cursor, "MATCH", &pattern, "COUNT", "100"]);
                let reply = client.command(&cmd).await?;

                let (next, batch) = match reply {
                    Value::Array(mut parts) if parts.len() == 2 => {
                        let batch = parts.pop().unwrap_or(Value::Null);
                        let next = parts.pop().unwrap_or(Value::Null);
                        (next, batch)
                    }
                    other => return Err(unexpected("SCAN", &other)),
                };

                let next = match next {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    other => return Err(unexpected("SCAN", &other)),
                };

                if let Value::Array(items) = batch {
                    keys.extend(items.into_iter().filter_map(|v| match v {
                        Value::String(s) => Some(s),
                        _ => None,
                    }));
                }

                if next == "0" {
                    break;
                }
                cursor = next;
            }

            Ok(keys)
        })
        .await
    }

    /// Run one operation with the shared "no client / error => default" policy
    async fn run<T, F, Fut>(&self, command: &str, key: &str, default: T, op: F) -> T
    where
        F: FnOnce(Arc<RestClient>) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let Some(client) = self.get_client().await else {
            return default;
        };

        match op(client).await {
            Ok(value) => value,
            Err(e) => {
                warn!(command = %command, key = %key, "Remote cache operation failed: {}", e);
                default
            }
        }
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Values are stored as JSON text; tolerate services that return decoded JSON
fn decode<T: DeserializeOwned>(reply: Value) -> Result<T> {
    match reply {
        Value::String(text) => match serde_json::from_str(&text) {
            Ok(value) => Ok(value),
            Err(_) => Ok(serde_json::from_value(Value::String(text))?),
        },
        other => Ok(serde_json::from_value(other)?),
    }
}

fn expect_integer(command: &str, reply: &Value) -> Result<i64> {
    match reply {
        Value::Number(n) => n.as_i64().ok_or_else(|| unexpected(command, reply)),
        Value::String(s) => s.parse().map_err(|_| unexpected(command, reply)),
        _ => Err(unexpected(command, reply)),
    }
}

fn unexpected(command: &str, reply: &Value) -> CacheError {
    CacheError::UnexpectedReply {
        command: command.to_string(),
        reply: reply.to_string(),
    }
}

fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
