//! Event delivery: handler contract, idempotent wrapper, bus and the
//! application's cache handlers.

mod bus;
mod handlers;
mod idempotent;

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::events::{DomainEvent, SHORTENED_URL_CREATED, SHORTENED_URL_REMOVED};
use crate::domain::repositories::OutboxConsumerRepository;
use crate::error::AppError;
use crate::infrastructure::cache::CacheService;

pub use bus::{EventBus, EventBusBuilder};
pub use handlers::{
    CACHE_EVICTOR, LIST_INVALIDATOR, ShortenedUrlCacheEvictor, ShortenedUrlListInvalidator,
};
pub use idempotent::IdempotentHandler;

/// Reacts to a published domain event.
///
/// Errors are reported back to the dispatcher, which retries delivery.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent) -> Result<(), AppError>;
}

/// Builds the bus with every handler the application ships.
pub fn default_event_bus(
    consumers: Arc<dyn OutboxConsumerRepository>,
    cache: Arc<dyn CacheService>,
) -> Result<EventBus, AppError> {
    EventBus::builder(consumers)
        .subscribe(
            SHORTENED_URL_CREATED,
            LIST_INVALIDATOR,
            Arc::new(ShortenedUrlListInvalidator::new(cache.clone())),
        )
        .subscribe(
            SHORTENED_URL_REMOVED,
            CACHE_EVICTOR,
            Arc::new(ShortenedUrlCacheEvictor::new(cache)),
        )
        .build()
}
