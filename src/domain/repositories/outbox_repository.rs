//! Repository traits for the outbox and its consumer markers.

use crate::domain::entities::{OutboxMessage, OutboxMessageConsumer, OutboxStats};
use crate::error::AppError;
use async_trait::async_trait;
use uuid::Uuid;

/// Exclusive right to dispatch the outbox, held for one run.
///
/// Dropping a lease without releasing it still frees it, but possibly later.
#[async_trait]
pub trait DispatchLease: Send {
    async fn release(self: Box<Self>) -> Result<(), AppError>;
}

/// Read/update access to outbox messages.
///
/// Messages are inserted by [`super::ShortenedUrlRepository`] saves, never here.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Takes the store-wide dispatch lease.
    ///
    /// Returns `Ok(None)` while any other dispatcher, in this process or
    /// another, holds it.
    async fn try_acquire_dispatch_lease(&self) -> Result<Option<Box<dyn DispatchLease>>, AppError>;

    /// Returns at most `limit` unprocessed messages in insertion order.
    async fn fetch_unprocessed(&self, limit: i64) -> Result<Vec<OutboxMessage>, AppError>;

    /// Writes `processed_on_utc` and `error` of every given message in one save.
    async fn save_processed(&self, messages: &[OutboxMessage]) -> Result<(), AppError>;

    /// Counts pending, processed and failed messages.
    async fn stats(&self) -> Result<OutboxStats, AppError>;

    /// Clears the processed marker and error of a message.
    ///
    /// Returns `Ok(false)` if no message has this id.
    async fn requeue(&self, id: Uuid) -> Result<bool, AppError>;
}

/// Durable idempotency markers keyed by (event id, consumer name).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutboxConsumerRepository: Send + Sync {
    async fn exists(&self, event_id: Uuid, consumer: &str) -> Result<bool, AppError>;

    /// Records that a consumer handled an event.
    ///
    /// Inserting an existing marker is not an error.
    async fn insert(&self, consumer: OutboxMessageConsumer) -> Result<(), AppError>;
}
