//! Caching layer for query results.
//!
//! Provides a [`CacheService`] trait with three implementations:
//! - [`RedisCache`] - production Redis-backed cache
//! - [`MemoryCache`] - in-process cache for tests and single-node runs
//! - [`NullCache`] - no-op implementation for disabled caching
//!
//! Cache keys used by the application live in [`keys`].

mod memory_cache;
mod null_cache;
mod redis_cache;
mod service;

pub use memory_cache::MemoryCache;
pub use null_cache::NullCache;
pub use redis_cache::RedisCache;
pub use service::{CacheError, CacheResult, CacheService, get_or_load};

/// Cache key builders.
pub mod keys {
    /// Prefix shared by every cached page of the URL listing.
    pub const SHORTENED_URL_LIST_PREFIX: &str = "shortened-urls:";

    /// Key of the original URL resolved from `code`.
    pub fn shortened_url(code: &str) -> String {
        format!("shortened-url:{code}")
    }

    /// Key of one page of the URL listing.
    pub fn shortened_url_page(page: i64, page_size: i64) -> String {
        format!("{SHORTENED_URL_LIST_PREFIX}page:{page}:{page_size}")
    }
}
