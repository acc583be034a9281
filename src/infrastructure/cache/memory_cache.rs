//! In-process cache with an ordered key index.

use super::service::{CacheResult, CacheService};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Cache backed by a `BTreeMap`, so keys sharing a prefix are contiguous
/// and prefix removal is a range scan.
pub struct MemoryCache {
    entries: RwLock<BTreeMap<String, Entry>>,
    default_ttl: Duration,
}

impl MemoryCache {
    pub fn new(default_ttl_seconds: u64) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            default_ttl: Duration::from_secs(default_ttl_seconds),
        }
    }

    /// Number of stored entries. Expired entries linger until the next write.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheService for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                debug!("Cache HIT: {}", key);
                Ok(Some(entry.value.clone()))
            }
            _ => {
                debug!("Cache MISS: {}", key);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> CacheResult<()> {
        let ttl = ttl_seconds.map_or(self.default_ttl, Duration::from_secs);
        let now = Instant::now();

        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn remove_by_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);

        let keys: Vec<String> = entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &keys {
            entries.remove(key);
        }

        debug!("Cache INVALIDATE prefix {}: {} keys", prefix, keys.len());
        Ok(keys.len())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_remove() {
        let cache = MemoryCache::new(60);

        cache.set("shortened-url:abc", "https://example.com", None).await.unwrap();
        assert_eq!(
            cache.get("shortened-url:abc").await.unwrap().as_deref(),
            Some("https://example.com")
        );

        cache.remove("shortened-url:abc").await.unwrap();
        assert!(cache.get("shortened-url:abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_expires_immediately() {
        let cache = MemoryCache::new(60);
        cache.set("k", "v", Some(0)).await.unwrap();

        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_are_purged_on_write() {
        let cache = MemoryCache::new(60);
        cache.set("shortened-url:gone", "v", Some(0)).await.unwrap();
        cache.set("shortened-url:gone-too", "v", Some(0)).await.unwrap();

        cache.set("shortened-url:kept", "v", None).await.unwrap();

        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_by_prefix_purges_expired_entries() {
        let cache = MemoryCache::new(60);
        cache.set("shortened-url:gone", "v", Some(0)).await.unwrap();

        assert_eq!(cache.remove_by_prefix("shortened-urls:").await.unwrap(), 0);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_by_prefix_only_touches_prefix() {
        let cache = MemoryCache::new(60);
        for key in [
            "shortened-urls:page:1:20",
            "shortened-urls:page:2:20",
            "shortened-url:abc",
            "shortened-urlz",
            "other",
        ] {
            cache.set(key, "v", None).await.unwrap();
        }

        let removed = cache.remove_by_prefix("shortened-urls:").await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(cache.len().await, 3);
        assert!(cache.get("shortened-url:abc").await.unwrap().is_some());
        assert!(cache.get("shortened-urlz").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_by_prefix_on_empty_cache() {
        let cache = MemoryCache::new(60);
        assert_eq!(cache.remove_by_prefix("x").await.unwrap(), 0);
        assert!(cache.is_empty().await);
    }
}
