//! Creation, resolution, listing and removal of shortened URLs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::code_generator::CodeGenerator;
use crate::domain::audit::EntityState;
use crate::domain::entities::ShortenedUrl;
use crate::domain::repositories::ShortenedUrlRepository;
use crate::error::AppError;
use crate::infrastructure::cache::{CacheService, get_or_load, keys};
use crate::utils::code_generator::CodeSettings;
use crate::utils::url_validator::{short_url_base, validate_original_url};

/// Attempts made to allocate and persist a URL before giving up.
pub const MAX_CREATE_ATTEMPTS: usize = 5;

/// Largest page accepted by [`ShortenedUrlService::list`].
pub const MAX_PAGE_SIZE: i64 = 100;

/// A request to shorten `original_url`, with the scheme and host the short
/// URL should be built from.
#[derive(Debug, Clone)]
pub struct ShortenUrl {
    pub original_url: String,
    pub scheme: String,
    pub host: String,
}

/// Cacheable projection of an active shortened URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortenedUrlView {
    pub code: String,
    pub original_url: String,
    pub short_url: String,
    pub created_on_utc: DateTime<Utc>,
}

impl From<&ShortenedUrl> for ShortenedUrlView {
    fn from(url: &ShortenedUrl) -> Self {
        Self {
            code: url.code.clone(),
            original_url: url.original_url.clone(),
            short_url: url.short_url.clone(),
            created_on_utc: url.audit.created_on_utc,
        }
    }
}

pub struct ShortenedUrlService<R: ShortenedUrlRepository> {
    repository: Arc<R>,
    codes: CodeGenerator<R>,
    cache: Arc<dyn CacheService>,
    cache_ttl: Option<u64>,
}

impl<R: ShortenedUrlRepository> ShortenedUrlService<R> {
    pub fn new(repository: Arc<R>, settings: CodeSettings, cache: Arc<dyn CacheService>) -> Self {
        Self {
            codes: CodeGenerator::new(repository.clone(), settings),
            repository,
            cache,
            cache_ttl: None,
        }
    }

    /// Overrides the cache's default TTL for entries written by this service.
    pub fn with_cache_ttl(mut self, ttl_seconds: u64) -> Self {
        self.cache_ttl = Some(ttl_seconds);
        self
    }

    /// Shortens a URL.
    ///
    /// Each attempt allocates a fresh code and saves the URL together with its
    /// `ShortenedUrlCreated` outbox message in one transaction. A failed save,
    /// including a code taken by a concurrent writer, costs one attempt.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] for an unusable URL or request context,
    /// without consuming any attempt.
    ///
    /// Returns [`AppError::Internal`] once [`MAX_CREATE_ATTEMPTS`] attempts
    /// have failed, carrying the last persistence error.
    #[tracing::instrument(skip(self, request), fields(original_url = %request.original_url))]
    pub async fn create(&self, request: ShortenUrl) -> Result<ShortenedUrl, AppError> {
        validate_original_url(&request.original_url).map_err(|e| {
            AppError::bad_request("Invalid URL format", json!({ "reason": e.to_string() }))
        })?;
        let base = short_url_base(&request.scheme, &request.host).map_err(|e| {
            AppError::bad_request("Invalid request context", json!({ "reason": e.to_string() }))
        })?;

        let mut last_error = None;

        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            metrics::counter!("short_url_create_attempts_total").increment(1);

            match self.try_create(&request.original_url, &base).await {
                Ok(url) => {
                    info!(code = %url.code, attempt, "Shortened URL created");
                    return Ok(url);
                }
                Err(e) if e.is_conflict() => {
                    warn!(attempt, error = %e, "Short code taken concurrently, retrying");
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Failed to save shortened URL, retrying");
                    last_error = Some(e);
                }
            }
        }

        let last_error = last_error.map(|e| e.to_string());
        Err(AppError::internal(
            format!("Failed to create short URL after {MAX_CREATE_ATTEMPTS} attempts"),
            json!({ "attempts": MAX_CREATE_ATTEMPTS, "last_error": last_error }),
        ))
    }

    async fn try_create(&self, original_url: &str, base: &str) -> Result<ShortenedUrl, AppError> {
        let code = self.codes.generate_unique_code().await?;
        let short_url = format!("{base}/{code}");

        let mut url = ShortenedUrl::create(original_url.to_string(), code, short_url);
        self.repository.add(&mut url).await?;

        Ok(url)
    }

    /// Returns the original URL behind an active code.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if no active URL has this code.
    pub async fn resolve(&self, code: &str) -> Result<String, AppError> {
        get_or_load(
            self.cache.as_ref(),
            &keys::shortened_url(code),
            self.cache_ttl,
            || async {
                self.repository
                    .find_by_code(code)
                    .await?
                    .map(|url| url.original_url)
                    .ok_or_else(|| {
                        AppError::not_found("Short URL not found", json!({ "code": code }))
                    })
            },
        )
        .await
    }

    /// Lists active URLs, newest first. `page` starts at 1.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] for a page below 1 or a page size
    /// outside `1..=MAX_PAGE_SIZE`.
    pub async fn list(&self, page: i64, page_size: i64) -> Result<Vec<ShortenedUrlView>, AppError> {
        if page < 1 || !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(AppError::bad_request(
                "Invalid pagination",
                json!({ "page": page, "page_size": page_size, "max_page_size": MAX_PAGE_SIZE }),
            ));
        }

        get_or_load(
            self.cache.as_ref(),
            &keys::shortened_url_page(page, page_size),
            self.cache_ttl,
            || async {
                let urls = self
                    .repository
                    .list((page - 1) * page_size, page_size)
                    .await?;
                Ok::<_, AppError>(urls.iter().map(ShortenedUrlView::from).collect())
            },
        )
        .await
    }

    /// Soft-deletes an active URL and records `ShortenedUrlRemoved`.
    ///
    /// Cached entries are evicted once the event is dispatched.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if no active URL has this code.
    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, code: &str) -> Result<(), AppError> {
        let mut url = self
            .repository
            .find_by_code(code)
            .await?
            .ok_or_else(|| AppError::not_found("Short URL not found", json!({ "code": code })))?;

        url.remove();
        self.repository.update(&mut url, EntityState::Deleted).await?;

        info!(code = %code, "Shortened URL removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::HasDomainEvents;
    use crate::domain::repositories::MockShortenedUrlRepository;
    use crate::infrastructure::cache::{MemoryCache, NullCache};

    fn request(url: &str) -> ShortenUrl {
        ShortenUrl {
            original_url: url.to_string(),
            scheme: "https".to_string(),
            host: "short.ly".to_string(),
        }
    }

    fn service(repo: MockShortenedUrlRepository) -> ShortenedUrlService<MockShortenedUrlRepository> {
        ShortenedUrlService::new(Arc::new(repo), CodeSettings::default(), Arc::new(NullCache::new()))
    }

    #[tokio::test]
    async fn test_create_builds_short_url_from_context() {
        let mut repo = MockShortenedUrlRepository::new();
        repo.expect_exists_by_code().returning(|_| Ok(false));
        repo.expect_add().times(1).returning(|_| Ok(()));

        let url = service(repo)
            .create(request("https://example.com/very/long/path"))
            .await
            .unwrap();

        assert_eq!(url.original_url, "https://example.com/very/long/path");
        assert_eq!(url.code.len(), 7);
        assert!(url.code.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(url.short_url, format!("https://short.ly/{}", url.code));
        assert_eq!(url.domain_events().len(), 1);
    }

    #[tokio::test]
    async fn test_create_gives_up_after_five_failed_saves() {
        let mut repo = MockShortenedUrlRepository::new();
        repo.expect_exists_by_code().returning(|_| Ok(false));
        repo.expect_add()
            .times(MAX_CREATE_ATTEMPTS)
            .returning(|_| Err(AppError::internal("Database error", json!({}))));

        let err = service(repo)
            .create(request("https://example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Internal { .. }));
        assert_eq!(err.details()["attempts"], json!(MAX_CREATE_ATTEMPTS));
        assert_eq!(err.details()["last_error"], json!("Database error"));
    }

    #[tokio::test]
    async fn test_create_counts_code_conflicts_against_budget() {
        let mut repo = MockShortenedUrlRepository::new();
        repo.expect_exists_by_code().returning(|_| Ok(false));
        repo.expect_add().times(MAX_CREATE_ATTEMPTS).returning(|_| {
            Err(AppError::conflict(
                "Resource already exists",
                json!({ "constraint": "shortened_urls_code_key" }),
            ))
        });

        assert!(service(repo).create(request("https://example.com")).await.is_err());
    }

    #[tokio::test]
    async fn test_create_succeeds_after_transient_failures() {
        let mut repo = MockShortenedUrlRepository::new();
        let mut seq = mockall::Sequence::new();
        repo.expect_exists_by_code().returning(|_| Ok(false));
        repo.expect_add()
            .times(3)
            .in_sequence(&mut seq)
            .returning(|_| Err(AppError::internal("Database error", json!({}))));
        repo.expect_add()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        assert!(service(repo).create(request("https://example.com")).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_failed_allocation_costs_an_attempt() {
        let mut repo = MockShortenedUrlRepository::new();
        let mut seq = mockall::Sequence::new();
        repo.expect_exists_by_code()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(AppError::internal("Database error", json!({}))));
        repo.expect_exists_by_code()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(false));
        repo.expect_add().times(1).returning(|_| Ok(()));

        assert!(service(repo).create(request("https://example.com")).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input_without_attempts() {
        let mut repo = MockShortenedUrlRepository::new();
        repo.expect_exists_by_code().times(0);
        repo.expect_add().times(0);
        let service = service(repo);

        let err = service.create(request("not a url")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let mut bad_host = request("https://example.com");
        bad_host.host = String::new();
        let err = service.create(bad_host).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_resolve_caches_original_url() {
        let mut repo = MockShortenedUrlRepository::new();
        repo.expect_find_by_code().times(1).returning(|code| {
            Ok(Some(ShortenedUrl::create(
                "https://example.com".to_string(),
                code.to_string(),
                format!("https://short.ly/{code}"),
            )))
        });

        let service = ShortenedUrlService::new(
            Arc::new(repo),
            CodeSettings::default(),
            Arc::new(MemoryCache::new(60)),
        );

        assert_eq!(service.resolve("abc1234").await.unwrap(), "https://example.com");
        assert_eq!(service.resolve("abc1234").await.unwrap(), "https://example.com");
    }

    #[tokio::test]
    async fn test_resolve_unknown_code_is_not_found() {
        let mut repo = MockShortenedUrlRepository::new();
        repo.expect_find_by_code().returning(|_| Ok(None));

        let err = service(repo).resolve("missing").await.unwrap_err();

        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_translates_page_to_offset() {
        let mut repo = MockShortenedUrlRepository::new();
        repo.expect_list()
            .withf(|offset, limit| *offset == 40 && *limit == 20)
            .times(1)
            .returning(|_, _| Ok(vec![]));

        assert!(service(repo).list(3, 20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_rejects_bad_pagination() {
        let mut repo = MockShortenedUrlRepository::new();
        repo.expect_list().times(0);
        let service = service(repo);

        assert!(service.list(0, 20).await.is_err());
        assert!(service.list(1, 0).await.is_err());
        assert!(service.list(1, MAX_PAGE_SIZE + 1).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_soft_deletes_with_event() {
        let mut repo = MockShortenedUrlRepository::new();
        repo.expect_find_by_code().times(1).returning(|code| {
            Ok(Some(ShortenedUrl::restore(
                uuid::Uuid::new_v4(),
                "https://example.com".to_string(),
                code.to_string(),
                format!("https://short.ly/{code}"),
                Utc::now(),
                None,
                true,
            )))
        });
        repo.expect_update().times(1).returning(|url, state| {
            assert_eq!(state, EntityState::Deleted);
            assert_eq!(url.domain_events().len(), 1);
            assert_eq!(url.domain_events()[0].event_type(), "ShortenedUrlRemoved");
            Ok(())
        });

        service(repo).remove("abc1234").await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_unknown_code_is_not_found() {
        let mut repo = MockShortenedUrlRepository::new();
        repo.expect_find_by_code().returning(|_| Ok(None));
        repo.expect_update().times(0);

        assert!(matches!(
            service(repo).remove("missing").await,
            Err(AppError::NotFound { .. })
        ));
    }
}
