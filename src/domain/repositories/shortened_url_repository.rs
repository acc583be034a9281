//! Repository trait for shortened URL aggregates.

use crate::domain::audit::EntityState;
use crate::domain::entities::ShortenedUrl;
use crate::error::AppError;
use async_trait::async_trait;

/// Repository interface for [`ShortenedUrl`] aggregates.
///
/// Saving methods run the save-changes pass (audit fields + outbox capture)
/// and write the aggregate and its outbox messages in one transaction. The
/// aggregate's pending events are cleared only after the commit succeeds.
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::PgShortenedUrlRepository`] - PostgreSQL
/// - [`crate::infrastructure::persistence::InMemoryDatabase`] - in-process, for tests
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ShortenedUrlRepository: Send + Sync {
    /// Returns whether any URL, active or removed, already uses `code`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Internal`] on storage errors.
    async fn exists_by_code(&self, code: &str) -> Result<bool, AppError>;

    /// Inserts a new aggregate together with its pending events.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Conflict`] if the code is already taken,
    /// [`AppError::Internal`] on other storage errors. Nothing is written
    /// on error.
    async fn add(&self, url: &mut ShortenedUrl) -> Result<(), AppError>;

    /// Persists changes to an existing aggregate together with its pending events.
    ///
    /// `EntityState::Deleted` keeps the row and flags it inactive.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if the aggregate does not exist.
    async fn update(&self, url: &mut ShortenedUrl, state: EntityState) -> Result<(), AppError>;

    /// Finds an active URL by its code.
    async fn find_by_code(&self, code: &str) -> Result<Option<ShortenedUrl>, AppError>;

    /// Lists active URLs, newest first.
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<ShortenedUrl>, AppError>;
}
