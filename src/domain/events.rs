//! Domain events raised by aggregates.
//!
//! Events are immutable facts. The payload is a tagged union so that a stored
//! event can be decoded back into its exact variant: the serde tag doubles as
//! the outbox type discriminator (see [`EventPayload::event_type`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discriminator of [`ShortenedUrlCreated`].
pub const SHORTENED_URL_CREATED: &str = "ShortenedUrlCreated";
/// Discriminator of [`ShortenedUrlRemoved`].
pub const SHORTENED_URL_REMOVED: &str = "ShortenedUrlRemoved";

/// Something that happened to an aggregate.
///
/// `id` is globally unique and is reused as the outbox message id and as the
/// idempotency key of every consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub occurred_on_utc: DateTime<Utc>,
    pub payload: EventPayload,
}

impl DomainEvent {
    /// Creates an event with a fresh id, occurring now.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_on_utc: Utc::now(),
            payload,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    ShortenedUrlCreated(ShortenedUrlCreated),
    ShortenedUrlRemoved(ShortenedUrlRemoved),
}

impl EventPayload {
    /// Type discriminator stored next to the serialized payload.
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::ShortenedUrlCreated(_) => SHORTENED_URL_CREATED,
            EventPayload::ShortenedUrlRemoved(_) => SHORTENED_URL_REMOVED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortenedUrlCreated {
    pub shortened_url_id: Uuid,
    pub code: String,
    pub original_url: String,
    pub short_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortenedUrlRemoved {
    pub shortened_url_id: Uuid,
    pub code: String,
}

/// Aggregates that buffer events until the next save.
pub trait HasDomainEvents {
    fn domain_events(&self) -> &[DomainEvent];

    fn clear_domain_events(&mut self);
}
