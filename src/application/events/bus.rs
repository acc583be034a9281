//! In-process event bus.

use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use super::EventHandler;
use super::idempotent::IdempotentHandler;
use crate::domain::events::DomainEvent;
use crate::domain::repositories::OutboxConsumerRepository;
use crate::error::AppError;

struct Subscription {
    event_type: &'static str,
    handler: IdempotentHandler,
}

/// Fans an event out to every handler subscribed to its type.
///
/// Handlers can only be registered through [`EventBusBuilder`], which wraps
/// each one in an [`IdempotentHandler`].
pub struct EventBus {
    subscriptions: Vec<Subscription>,
}

impl EventBus {
    pub fn builder(consumers: Arc<dyn OutboxConsumerRepository>) -> EventBusBuilder {
        EventBusBuilder {
            consumers,
            subscriptions: Vec::new(),
        }
    }

    /// Invokes every subscribed handler in registration order.
    ///
    /// A failing handler does not stop the others.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Internal`] naming every consumer that failed.
    pub async fn publish(&self, event: &DomainEvent) -> Result<(), AppError> {
        let event_type = event.event_type();
        let mut failures = Vec::new();

        for subscription in self
            .subscriptions
            .iter()
            .filter(|s| s.event_type == event_type)
        {
            if let Err(e) = subscription.handler.handle(event).await {
                warn!(
                    event_id = %event.id,
                    consumer = %subscription.handler.consumer_name(),
                    error = %e,
                    "Event handler failed"
                );
                failures.push(format!("{}: {}", subscription.handler.consumer_name(), e));
            }
        }

        if failures.is_empty() {
            return Ok(());
        }

        Err(AppError::internal(
            format!(
                "{} handler(s) failed for {} {}: {}",
                failures.len(),
                event_type,
                event.id,
                failures.join("; ")
            ),
            json!({ "event_id": event.id, "event_type": event_type, "failures": failures }),
        ))
    }

    /// Number of handlers subscribed to `event_type`.
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.subscriptions
            .iter()
            .filter(|s| s.event_type == event_type)
            .count()
    }
}

/// Registers handlers for an [`EventBus`].
pub struct EventBusBuilder {
    consumers: Arc<dyn OutboxConsumerRepository>,
    subscriptions: Vec<Subscription>,
}

impl EventBusBuilder {
    /// Subscribes `handler` to events of `event_type` under `consumer_name`.
    ///
    /// The name is the idempotency key and must be unique per event type.
    pub fn subscribe(
        mut self,
        event_type: &'static str,
        consumer_name: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        self.subscriptions.push(Subscription {
            event_type,
            handler: IdempotentHandler::new(consumer_name, handler, self.consumers.clone()),
        });
        self
    }

    /// # Errors
    ///
    /// Returns [`AppError::Validation`] if a consumer name is registered twice
    /// for the same event type.
    pub fn build(self) -> Result<EventBus, AppError> {
        let mut seen = HashSet::new();
        for s in &self.subscriptions {
            if !seen.insert((s.event_type, s.handler.consumer_name())) {
                return Err(AppError::bad_request(
                    "Duplicate event consumer",
                    json!({ "event_type": s.event_type, "consumer": s.handler.consumer_name() }),
                ));
            }
        }

        Ok(EventBus {
            subscriptions: self.subscriptions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{
        EventPayload, SHORTENED_URL_CREATED, SHORTENED_URL_REMOVED, ShortenedUrlRemoved,
    };
    use crate::infrastructure::persistence::InMemoryDatabase;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, _event: &DomainEvent) -> Result<(), AppError> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                return Err(AppError::internal("nope", json!({})));
            }
            Ok(())
        }
    }

    fn recorder(
        name: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    ) -> Arc<dyn EventHandler> {
        Arc::new(Recorder {
            name,
            log: log.clone(),
            fail,
        })
    }

    fn removed() -> DomainEvent {
        DomainEvent::new(EventPayload::ShortenedUrlRemoved(ShortenedUrlRemoved {
            shortened_url_id: Uuid::new_v4(),
            code: "abc1234".to_string(),
        }))
    }

    #[tokio::test]
    async fn test_publish_routes_by_event_type_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = EventBus::builder(Arc::new(InMemoryDatabase::new()))
            .subscribe(SHORTENED_URL_REMOVED, "first", recorder("first", &log, false))
            .subscribe(SHORTENED_URL_CREATED, "other", recorder("other", &log, false))
            .subscribe(SHORTENED_URL_REMOVED, "second", recorder("second", &log, false))
            .build()
            .unwrap();

        bus.publish(&removed()).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(bus.subscriber_count(SHORTENED_URL_REMOVED), 2);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_other_handlers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = EventBus::builder(Arc::new(InMemoryDatabase::new()))
            .subscribe(SHORTENED_URL_REMOVED, "broken", recorder("broken", &log, true))
            .subscribe(SHORTENED_URL_REMOVED, "healthy", recorder("healthy", &log, false))
            .build()
            .unwrap();

        let err = bus.publish(&removed()).await.unwrap_err();

        assert_eq!(*log.lock().unwrap(), vec!["broken", "healthy"]);
        assert!(err.to_string().contains("broken"));
        assert!(!err.to_string().contains("healthy:"));
    }

    #[tokio::test]
    async fn test_republish_skips_consumed_handlers() {
        let db = InMemoryDatabase::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = EventBus::builder(Arc::new(db.clone()))
            .subscribe(SHORTENED_URL_REMOVED, "broken", recorder("broken", &log, true))
            .subscribe(SHORTENED_URL_REMOVED, "healthy", recorder("healthy", &log, false))
            .build()
            .unwrap();
        let event = removed();

        assert!(bus.publish(&event).await.is_err());
        assert!(bus.publish(&event).await.is_err());

        assert_eq!(
            *log.lock().unwrap(),
            vec!["broken", "healthy", "broken"]
        );
        assert_eq!(db.consumers().await.len(), 1);
    }

    #[test]
    fn test_duplicate_consumer_name_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let result = EventBus::builder(Arc::new(InMemoryDatabase::new()))
            .subscribe(SHORTENED_URL_REMOVED, "same", recorder("a", &log, false))
            .subscribe(SHORTENED_URL_REMOVED, "same", recorder("b", &log, false))
            .build();

        assert!(matches!(result, Err(AppError::Validation { .. })));
    }
}
