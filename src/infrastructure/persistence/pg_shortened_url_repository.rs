//! PostgreSQL implementation of the shortened URL repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::pg_outbox_repository::insert_outbox_messages;
use super::save_changes::{finish_save, prepare_save};
use crate::domain::audit::EntityState;
use crate::domain::entities::ShortenedUrl;
use crate::domain::repositories::ShortenedUrlRepository;
use crate::error::AppError;

#[derive(sqlx::FromRow)]
struct ShortenedUrlRow {
    id: Uuid,
    original_url: String,
    code: String,
    short_url: String,
    created_on_utc: DateTime<Utc>,
    updated_on_utc: Option<DateTime<Utc>>,
    is_active: bool,
}

impl From<ShortenedUrlRow> for ShortenedUrl {
    fn from(r: ShortenedUrlRow) -> Self {
        ShortenedUrl::restore(
            r.id,
            r.original_url,
            r.code,
            r.short_url,
            r.created_on_utc,
            r.updated_on_utc,
            r.is_active,
        )
    }
}

/// PostgreSQL repository for shortened URLs.
///
/// Every save writes the aggregate row and its outbox messages in a single
/// transaction.
pub struct PgShortenedUrlRepository {
    pool: Arc<PgPool>,
}

impl PgShortenedUrlRepository {
    /// Creates a new repository with a database connection pool.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShortenedUrlRepository for PgShortenedUrlRepository {
    async fn exists_by_code(&self, code: &str) -> Result<bool, AppError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM shortened_urls WHERE code = $1)")
                .bind(code)
                .fetch_one(self.pool.as_ref())
                .await?;

        Ok(exists)
    }

    async fn add(&self, url: &mut ShortenedUrl) -> Result<(), AppError> {
        let prepared = prepare_save(&*url, EntityState::Added, Utc::now())?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO shortened_urls
                (id, original_url, code, short_url, created_on_utc, updated_on_utc, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(url.id)
        .bind(&url.original_url)
        .bind(&url.code)
        .bind(&url.short_url)
        .bind(prepared.audit.created_on_utc)
        .bind(prepared.audit.updated_on_utc)
        .bind(prepared.audit.is_active)
        .execute(&mut *tx)
        .await?;

        insert_outbox_messages(&mut tx, &prepared.messages).await?;

        tx.commit().await?;
        finish_save(url, prepared.audit);

        Ok(())
    }

    async fn update(&self, url: &mut ShortenedUrl, state: EntityState) -> Result<(), AppError> {
        let prepared = prepare_save(&*url, state, Utc::now())?;

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE shortened_urls
            SET original_url = $2, short_url = $3, updated_on_utc = $4, is_active = $5
            WHERE id = $1
            "#,
        )
        .bind(url.id)
        .bind(&url.original_url)
        .bind(&url.short_url)
        .bind(prepared.audit.updated_on_utc)
        .bind(prepared.audit.is_active)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(
                "Shortened URL not found",
                json!({ "id": url.id }),
            ));
        }

        insert_outbox_messages(&mut tx, &prepared.messages).await?;

        tx.commit().await?;
        finish_save(url, prepared.audit);

        Ok(())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<ShortenedUrl>, AppError> {
        let row = sqlx::query_as::<_, ShortenedUrlRow>(
            r#"
            SELECT id, original_url, code, short_url, created_on_utc, updated_on_utc, is_active
            FROM shortened_urls
            WHERE code = $1 AND is_active
            "#,
        )
        .bind(code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(ShortenedUrl::from))
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<ShortenedUrl>, AppError> {
        let rows = sqlx::query_as::<_, ShortenedUrlRow>(
            r#"
            SELECT id, original_url, code, short_url, created_on_utc, updated_on_utc, is_active
            FROM shortened_urls
            WHERE is_active
            ORDER BY created_on_utc DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(ShortenedUrl::from).collect())
    }
}
