//! Domain layer: aggregates, events and persistence contracts.
//!
//! - [`entities`] - the shortened URL aggregate and outbox records
//! - [`events`] - domain events and their tagged payloads
//! - [`audit`] - audit fields and the soft-delete policy
//! - [`repositories`] - storage traits implemented by the infrastructure layer
//!
//! # Event Flow
//!
//! 1. An aggregate method raises a [`events::DomainEvent`]
//! 2. The repository save writes the aggregate and an
//!    [`entities::OutboxMessage`] per event in one transaction
//! 3. The outbox dispatcher publishes the decoded event to its handlers
//! 4. Each handler records an [`entities::OutboxMessageConsumer`] once done

pub mod audit;
pub mod entities;
pub mod events;
pub mod repositories;
