//! Redis-backed cache implementation.

use super::service::{CacheError, CacheResult, CacheService};
use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, Client, RedisResult, aio::ConnectionManager};
use tracing::{debug, error, info, warn};

/// Sorted set holding every live key written through this cache (all scores 0),
/// so that lexicographic range queries find keys by prefix without `KEYS`/`SCAN`.
const INDEX_KEY: &str = "cache:index";

/// Sorted set of the same keys scored by expiry time (unix seconds).
const EXPIRY_KEY: &str = "cache:expiry";

/// Expired index members dropped per write.
const PRUNE_BATCH: usize = 100;

/// Writes the value, indexes the key, then drops index members whose value
/// has expired. One script so a key re-set concurrently is never unindexed.
///
/// KEYS: value key, index, expiry index. ARGV: value, ttl, expires at, now, prune batch.
const SET_SCRIPT: &str = r#"
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])
redis.call('ZADD', KEYS[2], 0, KEYS[1])
redis.call('ZADD', KEYS[3], ARGV[3], KEYS[1])
local expired = redis.call('ZRANGEBYSCORE', KEYS[3], '-inf', ARGV[4], 'LIMIT', 0, ARGV[5])
if #expired > 0 then
  redis.call('ZREM', KEYS[2], unpack(expired))
  redis.call('ZREM', KEYS[3], unpack(expired))
end
return #expired
"#;

/// Redis cache implementation.
///
/// Uses connection pooling via `ConnectionManager`. Reads and writes are
/// fail-open: errors are logged and reported as misses or no-ops.
pub struct RedisCache {
    client: ConnectionManager,
    default_ttl: u64,
}

impl RedisCache {
    /// Connects to Redis, validates the connection with a PING, and configures the default TTL.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::ConnectionError`] if the URL is invalid, the connection cannot
    /// be established, or the PING health check fails.
    pub async fn connect(redis_url: &str, default_ttl_seconds: u64) -> CacheResult<Self> {
        info!("Connecting to Redis");

        let client = Client::open(redis_url).map_err(|e| {
            CacheError::ConnectionError(format!("Failed to create Redis client: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            CacheError::ConnectionError(format!("Failed to connect to Redis: {}", e))
        })?;

        let mut test_conn = manager.clone();
        test_conn
            .ping::<()>()
            .await
            .map_err(|e| CacheError::ConnectionError(format!("Redis PING failed: {}", e)))?;

        info!("Connected to Redis");

        Ok(Self {
            client: manager,
            default_ttl: default_ttl_seconds,
        })
    }
}

fn expires_at(now: i64, ttl_seconds: u64) -> i64 {
    now.saturating_add(i64::try_from(ttl_seconds).unwrap_or(i64::MAX))
}

/// Upper bound of a `ZRANGEBYLEX` range covering every member starting with `prefix`.
fn prefix_upper_bound(prefix: &str) -> String {
    format!("[{}\u{10FFFF}", prefix)
}

#[async_trait]
impl CacheService for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.client.clone();

        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(value)) => {
                debug!("Cache HIT: {}", key);
                Ok(Some(value))
            }
            Ok(None) => {
                debug!("Cache MISS: {}", key);
                Ok(None)
            }
            Err(e) => {
                error!("Redis GET error for {}: {}", key, e);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> CacheResult<()> {
        let mut conn = self.client.clone();
        let ttl = ttl_seconds.unwrap_or(self.default_ttl);

        let now = Utc::now().timestamp();

        let result: RedisResult<usize> = redis::cmd("EVAL")
            .arg(SET_SCRIPT)
            .arg(3)
            .arg(key)
            .arg(INDEX_KEY)
            .arg(EXPIRY_KEY)
            .arg(value)
            .arg(ttl)
            .arg(expires_at(now, ttl))
            .arg(now)
            .arg(PRUNE_BATCH)
            .query_async(&mut conn)
            .await;

        match result {
            Ok(pruned) => debug!("Cache SET: {} (TTL: {}s, pruned {})", key, ttl, pruned),
            Err(e) => warn!("Redis SET error for {}: {}", key, e),
        }

        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.client.clone();

        let result: RedisResult<()> = redis::pipe()
            .atomic()
            .del(key)
            .ignore()
            .zrem(INDEX_KEY, key)
            .ignore()
            .zrem(EXPIRY_KEY, key)
            .ignore()
            .query_async(&mut conn)
            .await;

        if let Err(e) = result {
            warn!("Redis DEL error for {}: {}", key, e);
        }

        Ok(())
    }

    async fn remove_by_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let mut conn = self.client.clone();

        let keys: Vec<String> = conn
            .zrangebylex(INDEX_KEY, format!("[{}", prefix), prefix_upper_bound(prefix))
            .await
            .map_err(|e| CacheError::OperationError(format!("ZRANGEBYLEX failed: {}", e)))?;

        if keys.is_empty() {
            return Ok(0);
        }

        let result: RedisResult<()> = redis::pipe()
            .atomic()
            .del(&keys)
            .ignore()
            .zrem(INDEX_KEY, &keys)
            .ignore()
            .zrem(EXPIRY_KEY, &keys)
            .ignore()
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => {
                debug!("Cache INVALIDATE prefix {}: {} keys", prefix, keys.len());
                Ok(keys.len())
            }
            Err(e) => Err(CacheError::OperationError(format!(
                "Failed to remove keys under {}: {}",
                prefix, e
            ))),
        }
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.client.clone();
        conn.ping::<()>().await.is_ok()
    }
}
