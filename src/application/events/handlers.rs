//! Cache maintenance reacting to shortened URL events.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use super::EventHandler;
use crate::domain::events::{DomainEvent, EventPayload};
use crate::error::AppError;
use crate::infrastructure::cache::{CacheError, CacheService, keys};

/// Consumer name of [`ShortenedUrlListInvalidator`].
pub const LIST_INVALIDATOR: &str = "ShortenedUrlListInvalidator";
/// Consumer name of [`ShortenedUrlCacheEvictor`].
pub const CACHE_EVICTOR: &str = "ShortenedUrlCacheEvictor";

fn cache_failure(e: CacheError) -> AppError {
    AppError::internal(
        format!("Cache invalidation failed: {e}"),
        json!({ "reason": e.to_string() }),
    )
}

/// Drops every cached listing page when a URL is created.
pub struct ShortenedUrlListInvalidator {
    cache: Arc<dyn CacheService>,
}

impl ShortenedUrlListInvalidator {
    pub fn new(cache: Arc<dyn CacheService>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl EventHandler for ShortenedUrlListInvalidator {
    async fn handle(&self, event: &DomainEvent) -> Result<(), AppError> {
        if let EventPayload::ShortenedUrlCreated(created) = &event.payload {
            let removed = self
                .cache
                .remove_by_prefix(keys::SHORTENED_URL_LIST_PREFIX)
                .await
                .map_err(cache_failure)?;
            debug!(code = %created.code, removed, "Invalidated cached URL listings");
        }
        Ok(())
    }
}

/// Evicts the resolved entry and every listing page when a URL is removed.
pub struct ShortenedUrlCacheEvictor {
    cache: Arc<dyn CacheService>,
}

impl ShortenedUrlCacheEvictor {
    pub fn new(cache: Arc<dyn CacheService>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl EventHandler for ShortenedUrlCacheEvictor {
    async fn handle(&self, event: &DomainEvent) -> Result<(), AppError> {
        if let EventPayload::ShortenedUrlRemoved(removed) = &event.payload {
            self.cache
                .remove(&keys::shortened_url(&removed.code))
                .await
                .map_err(cache_failure)?;
            self.cache
                .remove_by_prefix(keys::SHORTENED_URL_LIST_PREFIX)
                .await
                .map_err(cache_failure)?;
            debug!(code = %removed.code, "Evicted cached URL");
        }
        Ok(())
    }
}
