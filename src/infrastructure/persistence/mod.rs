//! Repository implementations.
//!
//! - [`PgShortenedUrlRepository`], [`PgOutboxRepository`],
//!   [`PgOutboxConsumerRepository`] - PostgreSQL via SQLx
//! - [`InMemoryDatabase`] - all three traits over shared in-process tables
//! - [`save_changes`] - the audit and outbox hooks every save runs before commit

pub mod memory;
pub mod pg_outbox_repository;
pub mod pg_shortened_url_repository;
pub mod save_changes;

pub use memory::InMemoryDatabase;
pub use pg_outbox_repository::{PgOutboxConsumerRepository, PgOutboxRepository};
pub use pg_shortened_url_repository::PgShortenedUrlRepository;
