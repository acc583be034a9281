//! Outbox envelope and consumer marker entities.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::events::DomainEvent;

/// Reasons a stored message cannot be turned back into a [`DomainEvent`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid event payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("type discriminator mismatch: stored `{stored}`, payload `{decoded}`")]
    TypeMismatch {
        stored: String,
        decoded: &'static str,
    },
}

/// A durable envelope for a domain event awaiting dispatch.
///
/// `id` always equals the wrapped event's id.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub event_type: String,
    pub content: String,
    pub occurred_on_utc: DateTime<Utc>,
    pub processed_on_utc: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl OutboxMessage {
    /// Serializes an event into an unprocessed envelope.
    pub fn from_event(event: &DomainEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: event.id,
            event_type: event.event_type().to_string(),
            content: serde_json::to_string(event)?,
            occurred_on_utc: event.occurred_on_utc,
            processed_on_utc: None,
            error: None,
        })
    }

    /// Recovers the concrete event, checking it against the stored discriminator.
    pub fn decode(&self) -> Result<DomainEvent, DecodeError> {
        let event: DomainEvent = serde_json::from_str(&self.content)?;

        if event.event_type() != self.event_type {
            return Err(DecodeError::TypeMismatch {
                stored: self.event_type.clone(),
                decoded: event.event_type(),
            });
        }

        Ok(event)
    }

    pub fn is_processed(&self) -> bool {
        self.processed_on_utc.is_some()
    }

    /// Terminal transition: processed, with the last delivery error if any.
    pub fn mark_processed(&mut self, now: DateTime<Utc>, error: Option<String>) {
        self.processed_on_utc = Some(now);
        self.error = error;
    }

    /// Makes the message eligible for dispatch again.
    pub fn requeue(&mut self) {
        self.processed_on_utc = None;
        self.error = None;
    }
}

/// Marker that a consumer has fully handled an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutboxMessageConsumer {
    pub id: Uuid,
    pub name: String,
}

impl OutboxMessageConsumer {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Counts of outbox rows by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboxStats {
    pub pending: i64,
    pub processed: i64,
    pub failed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{EventPayload, ShortenedUrlCreated, SHORTENED_URL_CREATED};

    fn created_event() -> DomainEvent {
        DomainEvent::new(EventPayload::ShortenedUrlCreated(ShortenedUrlCreated {
            shortened_url_id: Uuid::new_v4(),
            code: "Ab3xY9k".to_string(),
            original_url: "https://example.com".to_string(),
            short_url: "https://short.ly/Ab3xY9k".to_string(),
        }))
    }

    #[test]
    fn test_message_id_equals_event_id() {
        let event = created_event();
        let message = OutboxMessage::from_event(&event).unwrap();

        assert_eq!(message.id, event.id);
        assert_eq!(message.event_type, SHORTENED_URL_CREATED);
        assert_eq!(message.occurred_on_utc, event.occurred_on_utc);
        assert!(!message.is_processed());
        assert!(message.error.is_none());
    }

    #[test]
    fn test_decode_returns_original_event() {
        let event = created_event();
        let message = OutboxMessage::from_event(&event).unwrap();

        assert_eq!(message.decode().unwrap(), event);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let mut message = OutboxMessage::from_event(&created_event()).unwrap();
        message.content = "{not json".to_string();

        assert!(matches!(message.decode(), Err(DecodeError::Payload(_))));
    }

    #[test]
    fn test_decode_rejects_discriminator_mismatch() {
        let mut message = OutboxMessage::from_event(&created_event()).unwrap();
        message.event_type = "ShortenedUrlRemoved".to_string();

        assert!(matches!(
            message.decode(),
            Err(DecodeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_mark_processed_and_requeue() {
        let mut message = OutboxMessage::from_event(&created_event()).unwrap();

        message.mark_processed(Utc::now(), Some("boom".to_string()));
        assert!(message.is_processed());
        assert_eq!(message.error.as_deref(), Some("boom"));

        message.requeue();
        assert!(!message.is_processed());
        assert!(message.error.is_none());
    }
}
