//! Core domain entities.
//!
//! - [`ShortenedUrl`] - the aggregate owning a short code
//! - [`OutboxMessage`] - a persisted domain event awaiting dispatch
//! - [`OutboxMessageConsumer`] - proof that a consumer handled an event

pub mod outbox_message;
pub mod shortened_url;

pub use outbox_message::{DecodeError, OutboxMessage, OutboxMessageConsumer, OutboxStats};
pub use shortened_url::ShortenedUrl;
