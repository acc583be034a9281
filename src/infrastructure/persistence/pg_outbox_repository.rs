//! PostgreSQL implementation of the outbox and consumer repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::entities::{OutboxMessage, OutboxMessageConsumer, OutboxStats};
use crate::domain::repositories::{DispatchLease, OutboxConsumerRepository, OutboxRepository};
use crate::error::AppError;

#[derive(sqlx::FromRow)]
struct OutboxMessageRow {
    id: Uuid,
    #[sqlx(rename = "type")]
    event_type: String,
    content: String,
    occurred_on_utc: DateTime<Utc>,
    processed_on_utc: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl From<OutboxMessageRow> for OutboxMessage {
    fn from(r: OutboxMessageRow) -> Self {
        OutboxMessage {
            id: r.id,
            event_type: r.event_type,
            content: r.content,
            occurred_on_utc: r.occurred_on_utc,
            processed_on_utc: r.processed_on_utc,
            error: r.error,
        }
    }
}

/// Inserts outbox messages on the caller's connection, normally inside the
/// transaction that saves the aggregate raising them.
pub(crate) async fn insert_outbox_messages(
    conn: &mut PgConnection,
    messages: &[OutboxMessage],
) -> Result<(), sqlx::Error> {
    for message in messages {
        sqlx::query(
            r#"
            INSERT INTO outbox_messages (id, type, content, occurred_on_utc, processed_on_utc, error)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(message.id)
        .bind(&message.event_type)
        .bind(&message.content)
        .bind(message.occurred_on_utc)
        .bind(message.processed_on_utc)
        .bind(&message.error)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Advisory lock key shared by every dispatcher on the database.
const DISPATCH_LOCK_KEY: i64 = 0x6f75_7462_6f78;

/// Holds `pg_try_advisory_xact_lock` inside an open transaction.
///
/// The lock ends with the transaction: on `release`, or on rollback when the
/// lease is dropped.
struct PgDispatchLease {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl DispatchLease for PgDispatchLease {
    async fn release(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }
}

/// PostgreSQL repository for outbox polling and marking.
pub struct PgOutboxRepository {
    pool: Arc<PgPool>,
}

impl PgOutboxRepository {
    /// Creates a new repository with a database connection pool.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxRepository for PgOutboxRepository {
    async fn try_acquire_dispatch_lease(&self) -> Result<Option<Box<dyn DispatchLease>>, AppError> {
        let mut tx = self.pool.begin().await?;

        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_xact_lock($1)")
            .bind(DISPATCH_LOCK_KEY)
            .fetch_one(&mut *tx)
            .await?;

        if !acquired {
            tx.rollback().await?;
            return Ok(None);
        }

        Ok(Some(Box::new(PgDispatchLease { tx })))
    }

    async fn fetch_unprocessed(&self, limit: i64) -> Result<Vec<OutboxMessage>, AppError> {
        let rows = sqlx::query_as::<_, OutboxMessageRow>(
            r#"
            SELECT id, type, content, occurred_on_utc, processed_on_utc, error
            FROM outbox_messages
            WHERE processed_on_utc IS NULL
            ORDER BY sequence
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(OutboxMessage::from).collect())
    }

    async fn save_processed(&self, messages: &[OutboxMessage]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        for message in messages {
            sqlx::query(
                "UPDATE outbox_messages SET processed_on_utc = $2, error = $3 WHERE id = $1",
            )
            .bind(message.id)
            .bind(message.processed_on_utc)
            .bind(&message.error)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn stats(&self) -> Result<OutboxStats, AppError> {
        let (pending, processed, failed): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE processed_on_utc IS NULL),
                COUNT(*) FILTER (WHERE processed_on_utc IS NOT NULL AND error IS NULL),
                COUNT(*) FILTER (WHERE processed_on_utc IS NOT NULL AND error IS NOT NULL)
            FROM outbox_messages
            "#,
        )
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(OutboxStats {
            pending,
            processed,
            failed,
        })
    }

    async fn requeue(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE outbox_messages SET processed_on_utc = NULL, error = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// PostgreSQL repository for consumer idempotency markers.
pub struct PgOutboxConsumerRepository {
    pool: Arc<PgPool>,
}

impl PgOutboxConsumerRepository {
    /// Creates a new repository with a database connection pool.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxConsumerRepository for PgOutboxConsumerRepository {
    async fn exists(&self, event_id: Uuid, consumer: &str) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM outbox_message_consumers WHERE id = $1 AND name = $2)",
        )
        .bind(event_id)
        .bind(consumer)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(exists)
    }

    async fn insert(&self, consumer: OutboxMessageConsumer) -> Result<(), AppError> {
        // A concurrent delivery may have recorded the same pair first.
        sqlx::query(
            "INSERT INTO outbox_message_consumers (id, name) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(consumer.id)
        .bind(&consumer.name)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }
}
