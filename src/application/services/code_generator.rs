//! Allocation of short codes that are not yet taken.

use std::sync::Arc;
use tracing::debug;

use crate::domain::repositories::ShortenedUrlRepository;
use crate::error::AppError;
use crate::utils::code_generator::{CodeSettings, generate_code};

/// Draws random codes until one is free in the repository.
///
/// A free code can still be taken by a concurrent writer before it is saved;
/// the storage uniqueness constraint is the final arbiter.
pub struct CodeGenerator<R: ShortenedUrlRepository> {
    repository: Arc<R>,
    settings: CodeSettings,
}

impl<R: ShortenedUrlRepository> CodeGenerator<R> {
    pub fn new(repository: Arc<R>, settings: CodeSettings) -> Self {
        Self {
            repository,
            settings,
        }
    }

    /// Returns a code with no stored row, active or not.
    ///
    /// # Errors
    ///
    /// Propagates repository errors from the existence check.
    pub async fn generate_unique_code(&self) -> Result<String, AppError> {
        loop {
            let code = generate_code(&self.settings);

            if !self.repository.exists_by_code(&code).await? {
                return Ok(code);
            }

            debug!(code = %code, "Short code already taken, drawing another");
            metrics::counter!("short_code_collisions_total").increment(1);
        }
    }
}
