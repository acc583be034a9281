//! Cache service trait, error types and the cached-query helper.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use tracing::warn;

/// Errors that can occur during cache operations.
#[derive(Debug)]
pub enum CacheError {
    ConnectionError(String),
    OperationError(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ConnectionError(e) => write!(f, "Cache connection error: {}", e),
            Self::OperationError(e) => write!(f, "Cache operation error: {}", e),
        }
    }
}

impl std::error::Error for CacheError {}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// String cache with prefix-based bulk invalidation.
///
/// Implementations keep an index of the keys they hold so that every key
/// under a prefix can be removed at once. Failures should degrade to misses
/// rather than disrupt callers.
///
/// # Implementations
///
/// - [`crate::infrastructure::cache::RedisCache`] - Redis with a sorted-set key index
/// - [`crate::infrastructure::cache::MemoryCache`] - in-process ordered map
/// - [`crate::infrastructure::cache::NullCache`] - no-op, caching disabled
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Returns the cached value, `Ok(None)` on miss.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Stores a value. `ttl_seconds = None` uses the implementation default.
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> CacheResult<()>;

    /// Removes a single key.
    async fn remove(&self, key: &str) -> CacheResult<()>;

    /// Removes every key starting with `prefix`. Returns how many were removed.
    async fn remove_by_prefix(&self, prefix: &str) -> CacheResult<usize>;

    /// Checks if the cache backend is healthy.
    async fn health_check(&self) -> bool;
}

/// Returns the cached JSON value under `key`, or runs `load` and caches its result.
///
/// Undecodable cache entries and cache failures fall through to `load`.
pub async fn get_or_load<T, E, F, Fut>(
    cache: &dyn CacheService,
    key: &str,
    ttl_seconds: Option<u64>,
    load: F,
) -> Result<T, E>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if let Ok(Some(raw)) = cache.get(key).await {
        match serde_json::from_str(&raw) {
            Ok(value) => return Ok(value),
            Err(e) => warn!("Discarding undecodable cache entry {}: {}", key, e),
        }
    }

    let value = load().await?;

    match serde_json::to_string(&value) {
        Ok(raw) => {
            if let Err(e) = cache.set(key, &raw, ttl_seconds).await {
                warn!("Cache SET failed for {}: {}", key, e);
            }
        }
        Err(e) => warn!("Failed to serialize cache entry {}: {}", key, e),
    }

    Ok(value)
}
