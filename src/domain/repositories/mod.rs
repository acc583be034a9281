//! Repository trait definitions for the domain layer.
//!
//! Traits define the persistence contracts; implementations live in
//! `crate::infrastructure::persistence`. Mock implementations are generated
//! with `mockall` for unit tests.
//!
//! # Available Repositories
//!
//! - [`ShortenedUrlRepository`] - aggregate storage, writes outbox rows on save
//! - [`OutboxRepository`] - dispatch lease, pending message polling and terminal marking
//! - [`OutboxConsumerRepository`] - idempotency markers

pub mod outbox_repository;
pub mod shortened_url_repository;

pub use outbox_repository::{DispatchLease, OutboxConsumerRepository, OutboxRepository};
pub use shortened_url_repository::ShortenedUrlRepository;

#[cfg(test)]
pub use outbox_repository::{MockOutboxConsumerRepository, MockOutboxRepository};
#[cfg(test)]
pub use shortened_url_repository::MockShortenedUrlRepository;
