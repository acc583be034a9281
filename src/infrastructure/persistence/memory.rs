//! In-process implementation of every repository trait.
//!
//! All tables live behind one async mutex, so each save is atomic: the
//! aggregate row and its outbox messages are written together or not at
//! all. Used by the test suites and for running the pipeline without
//! PostgreSQL.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::save_changes::{finish_save, prepare_save};
use crate::domain::audit::{AuditInfo, EntityState};
use crate::domain::entities::{OutboxMessage, OutboxMessageConsumer, OutboxStats, ShortenedUrl};
use crate::domain::events::HasDomainEvents;
use crate::domain::repositories::{
    DispatchLease, OutboxConsumerRepository, OutboxRepository, ShortenedUrlRepository,
};
use crate::error::AppError;

#[derive(Default)]
struct Tables {
    urls: Vec<ShortenedUrl>,
    outbox: Vec<OutboxMessage>,
    consumers: HashSet<OutboxMessageConsumer>,
}

/// Shared in-memory database. Clones share the same tables.
#[derive(Clone, Default)]
pub struct InMemoryDatabase {
    tables: Arc<Mutex<Tables>>,
    failing_saves: Arc<AtomicUsize>,
    dispatch_lock: Arc<Mutex<()>>,
}

struct InMemoryDispatchLease {
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl DispatchLease for InMemoryDispatchLease {
    async fn release(self: Box<Self>) -> Result<(), AppError> {
        Ok(())
    }
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` aggregate saves fail at commit time.
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    /// Seeds outbox messages directly, bypassing aggregates.
    pub async fn insert_outbox_messages(&self, messages: impl IntoIterator<Item = OutboxMessage>) {
        self.tables.lock().await.outbox.extend(messages);
    }

    /// Snapshot of the outbox table in insertion order.
    pub async fn outbox_messages(&self) -> Vec<OutboxMessage> {
        self.tables.lock().await.outbox.clone()
    }

    /// Snapshot of the consumer table.
    pub async fn consumers(&self) -> Vec<OutboxMessageConsumer> {
        self.tables.lock().await.consumers.iter().cloned().collect()
    }

    /// Snapshot of every stored URL, removed ones included.
    pub async fn shortened_urls(&self) -> Vec<ShortenedUrl> {
        self.tables.lock().await.urls.clone()
    }

    fn take_injected_failure(&self) -> Result<(), AppError> {
        let injected = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if injected {
            return Err(AppError::internal(
                "Database error",
                json!({ "reason": "transaction rolled back" }),
            ));
        }

        Ok(())
    }
}

fn stored_copy(url: &ShortenedUrl, audit: &AuditInfo) -> ShortenedUrl {
    let mut stored = url.clone();
    stored.audit = audit.clone();
    stored.clear_domain_events();
    stored
}

#[async_trait]
impl ShortenedUrlRepository for InMemoryDatabase {
    async fn exists_by_code(&self, code: &str) -> Result<bool, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables.urls.iter().any(|u| u.code == code))
    }

    async fn add(&self, url: &mut ShortenedUrl) -> Result<(), AppError> {
        let prepared = prepare_save(&*url, EntityState::Added, Utc::now())?;

        {
            let mut tables = self.tables.lock().await;
            self.take_injected_failure()?;

            if tables.urls.iter().any(|u| u.code == url.code || u.id == url.id) {
                return Err(AppError::conflict(
                    "Unique constraint violation",
                    json!({ "constraint": "shortened_urls_code_key" }),
                ));
            }

            tables.urls.push(stored_copy(url, &prepared.audit));
            tables.outbox.extend(prepared.messages);
        }

        finish_save(url, prepared.audit);
        Ok(())
    }

    async fn update(&self, url: &mut ShortenedUrl, state: EntityState) -> Result<(), AppError> {
        let prepared = prepare_save(&*url, state, Utc::now())?;

        {
            let mut tables = self.tables.lock().await;
            self.take_injected_failure()?;

            let Some(row) = tables.urls.iter_mut().find(|u| u.id == url.id) else {
                return Err(AppError::not_found(
                    "Shortened URL not found",
                    json!({ "id": url.id }),
                ));
            };

            *row = stored_copy(url, &prepared.audit);
            tables.outbox.extend(prepared.messages);
        }

        finish_save(url, prepared.audit);
        Ok(())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<ShortenedUrl>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .urls
            .iter()
            .find(|u| u.code == code && u.is_active())
            .cloned())
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<ShortenedUrl>, AppError> {
        let tables = self.tables.lock().await;
        let mut active: Vec<ShortenedUrl> =
            tables.urls.iter().filter(|u| u.is_active()).cloned().collect();
        active.sort_by(|a, b| b.audit.created_on_utc.cmp(&a.audit.created_on_utc));

        Ok(active
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}

#[async_trait]
impl OutboxRepository for InMemoryDatabase {
    async fn try_acquire_dispatch_lease(&self) -> Result<Option<Box<dyn DispatchLease>>, AppError> {
        Ok(self
            .dispatch_lock
            .clone()
            .try_lock_owned()
            .ok()
            .map(|guard| Box::new(InMemoryDispatchLease { _guard: guard }) as Box<dyn DispatchLease>))
    }

    async fn fetch_unprocessed(&self, limit: i64) -> Result<Vec<OutboxMessage>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .outbox
            .iter()
            .filter(|m| !m.is_processed())
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn save_processed(&self, messages: &[OutboxMessage]) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        for message in messages {
            if let Some(row) = tables.outbox.iter_mut().find(|m| m.id == message.id) {
                row.processed_on_utc = message.processed_on_utc;
                row.error = message.error.clone();
            }
        }
        Ok(())
    }

    async fn stats(&self) -> Result<OutboxStats, AppError> {
        let tables = self.tables.lock().await;
        let mut stats = OutboxStats::default();
        for message in &tables.outbox {
            match (message.is_processed(), message.error.is_some()) {
                (false, _) => stats.pending += 1,
                (true, false) => stats.processed += 1,
                (true, true) => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn requeue(&self, id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().await;
        match tables.outbox.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.requeue();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl OutboxConsumerRepository for InMemoryDatabase {
    async fn exists(&self, event_id: Uuid, consumer: &str) -> Result<bool, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .consumers
            .iter()
            .any(|c| c.id == event_id && c.name == consumer))
    }

    async fn insert(&self, consumer: OutboxMessageConsumer) -> Result<(), AppError> {
        self.tables.lock().await.consumers.insert(consumer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(code: &str) -> ShortenedUrl {
        ShortenedUrl::create(
            "https://example.com".to_string(),
            code.to_string(),
            format!("https://short.ly/{code}"),
        )
    }

    #[tokio::test]
    async fn test_add_writes_url_and_outbox_together() {
        let db = InMemoryDatabase::new();
        let mut url = sample("abc1234");
        let event_id = url.domain_events()[0].id;

        db.add(&mut url).await.unwrap();

        assert!(url.domain_events().is_empty());
        assert!(db.exists_by_code("abc1234").await.unwrap());
        let outbox = db.outbox_messages().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].id, event_id);
    }

    #[tokio::test]
    async fn test_rolled_back_save_leaves_no_outbox_row() {
        let db = InMemoryDatabase::new();
        db.fail_next_saves(1);
        let mut url = sample("abc1234");

        assert!(db.add(&mut url).await.is_err());

        assert!(!db.exists_by_code("abc1234").await.unwrap());
        assert!(db.outbox_messages().await.is_empty());
        assert_eq!(url.domain_events().len(), 1);
    }

    #[tokio::test]
    async fn test_rolled_back_delete_keeps_aggregate_unchanged() {
        let db = InMemoryDatabase::new();
        let mut url = sample("abc1234");
        db.add(&mut url).await.unwrap();
        let before = url.audit.clone();

        url.remove();
        db.fail_next_saves(1);
        assert!(db.update(&mut url, EntityState::Deleted).await.is_err());

        assert_eq!(url.audit, before);
        assert!(url.is_active());
        assert_eq!(url.domain_events().len(), 1);
        assert!(db.find_by_code("abc1234").await.unwrap().is_some());

        db.update(&mut url, EntityState::Deleted).await.unwrap();
        assert!(!url.is_active());
        assert!(url.domain_events().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_code_conflicts_atomically() {
        let db = InMemoryDatabase::new();
        db.add(&mut sample("abc1234")).await.unwrap();

        let result = db.add(&mut sample("abc1234")).await;

        assert!(matches!(result, Err(AppError::Conflict { .. })));
        assert_eq!(db.outbox_messages().await.len(), 1);
        assert_eq!(db.shortened_urls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_soft_delete_hides_but_keeps_code_reserved() {
        let db = InMemoryDatabase::new();
        let mut url = sample("abc1234");
        db.add(&mut url).await.unwrap();

        url.remove();
        db.update(&mut url, EntityState::Deleted).await.unwrap();

        assert!(db.find_by_code("abc1234").await.unwrap().is_none());
        assert!(db.exists_by_code("abc1234").await.unwrap());
        assert_eq!(db.outbox_messages().await.len(), 2);
    }

    #[tokio::test]
    async fn test_stats_and_requeue() {
        let db = InMemoryDatabase::new();
        db.add(&mut sample("aaaaaaa")).await.unwrap();
        db.add(&mut sample("bbbbbbb")).await.unwrap();

        let mut messages = db.fetch_unprocessed(10).await.unwrap();
        messages[0].mark_processed(Utc::now(), None);
        messages[1].mark_processed(Utc::now(), Some("boom".to_string()));
        db.save_processed(&messages).await.unwrap();

        let stats = db.stats().await.unwrap();
        assert_eq!((stats.pending, stats.processed, stats.failed), (0, 1, 1));

        assert!(db.requeue(messages[1].id).await.unwrap());
        assert!(!db.requeue(Uuid::new_v4()).await.unwrap());
        assert_eq!(db.fetch_unprocessed(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_lease_is_shared_by_clones() {
        let db = InMemoryDatabase::new();
        let other = db.clone();

        let lease = db.try_acquire_dispatch_lease().await.unwrap().unwrap();
        assert!(other.try_acquire_dispatch_lease().await.unwrap().is_none());

        lease.release().await.unwrap();
        assert!(other.try_acquire_dispatch_lease().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_consumer_insert_is_idempotent() {
        let db = InMemoryDatabase::new();
        let id = Uuid::new_v4();

        db.insert(OutboxMessageConsumer::new(id, "handler")).await.unwrap();
        db.insert(OutboxMessageConsumer::new(id, "handler")).await.unwrap();

        assert!(db.exists(id, "handler").await.unwrap());
        assert!(!db.exists(id, "other").await.unwrap());
        assert_eq!(db.consumers().await.len(), 1);
    }
}
