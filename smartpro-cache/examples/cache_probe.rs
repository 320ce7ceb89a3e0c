//! Manual cache probe
//!
//! Runs a few cache operations against the configured REST key-value
//! service, or against local file storage when none is configured or the
//! service is unreachable.
//!
//! ## Usage
//!
//! Set environment variables (optional):
//! ```bash
//! export KV_REST_API_URL="https://example.upstash.io"
//! export KV_REST_API_TOKEN="..."
//! ```
//!
//! Run the example:
//! ```bash
//! cargo run --example cache_probe
//! ```

use smartpro_cache::{
    Backend, CacheManager, CacheOptions, FileStorage, NullBackend, RemoteBackend, RemoteCache,
    RemoteCacheConfig,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("smartpro_cache=debug,cache_probe=info")
        .init();

    println!("=== SmartPRO Cache Probe ===\n");

    let backend: Arc<dyn Backend> = match RemoteCacheConfig::from_env() {
        Some(config) => {
            println!("Remote cache: {}", config.url);
            Arc::new(RemoteBackend::new(Arc::new(RemoteCache::new(config))))
        }
        None => {
            println!("Remote cache: not configured");
            Arc::new(NullBackend)
        }
    };

    let local = FileStorage::open_default()?;
    println!("Local storage: {}\n", local.path().display());

    let cache = CacheManager::new(backend.clone(), Some(Arc::new(local)));

    println!("Backend available: {}", backend.is_available().await);

    let stored = cache
        .set("probe:greeting", "hello", CacheOptions::seconds(30))
        .await;
    println!("set probe:greeting -> {}", stored);

    let value: Option<String> = cache.get("probe:greeting").await;
    println!("get probe:greeting -> {:?}", value);

    println!("has probe:greeting -> {}", cache.has("probe:greeting").await);
    println!("delete probe:greeting -> {}", cache.delete("probe:greeting").await);
    println!("clear probe: -> {}", cache.clear_by_prefix("probe:").await);

    println!("\n{}", cache.stats().await);

    Ok(())
}
