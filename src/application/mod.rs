//! Application layer.
//!
//! - [`services`] - shortened URL use cases and code allocation
//! - [`events`] - the event bus, idempotent consumption and cache handlers
//! - [`outbox`] - delivery of stored outbox messages to the bus

pub mod events;
pub mod outbox;
pub mod services;
