//! At-most-once decoration for event handlers.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::EventHandler;
use crate::domain::entities::OutboxMessageConsumer;
use crate::domain::events::DomainEvent;
use crate::domain::repositories::OutboxConsumerRepository;
use crate::error::AppError;

/// Runs the wrapped handler at most once per (event id, consumer name).
///
/// A consumer marker is written only after the handler succeeds, so a failed
/// run is retried on the next delivery while a completed one is skipped.
pub struct IdempotentHandler {
    consumer_name: String,
    inner: Arc<dyn EventHandler>,
    consumers: Arc<dyn OutboxConsumerRepository>,
}

impl IdempotentHandler {
    pub fn new(
        consumer_name: impl Into<String>,
        inner: Arc<dyn EventHandler>,
        consumers: Arc<dyn OutboxConsumerRepository>,
    ) -> Self {
        Self {
            consumer_name: consumer_name.into(),
            inner,
            consumers,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }
}

#[async_trait]
impl EventHandler for IdempotentHandler {
    async fn handle(&self, event: &DomainEvent) -> Result<(), AppError> {
        if self.consumers.exists(event.id, &self.consumer_name).await? {
            debug!(
                event_id = %event.id,
                consumer = %self.consumer_name,
                "Event already consumed, skipping"
            );
            return Ok(());
        }

        self.inner.handle(event).await?;

        match self
            .consumers
            .insert(OutboxMessageConsumer::new(event.id, &self.consumer_name))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_conflict() => {
                warn!(
                    event_id = %event.id,
                    consumer = %self.consumer_name,
                    "Consumer marker already recorded by a concurrent delivery"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
