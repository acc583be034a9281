use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::Job;
use crate::application::outbox::{DispatchReport, OutboxDispatcher};
use crate::domain::repositories::OutboxRepository;
use crate::error::AppError;

pub const PROCESS_OUTBOX_MESSAGES_JOB: &str = "ProcessOutboxMessagesJob";

/// Result of the latest outbox job run.
#[derive(Debug, Clone, Serialize)]
pub struct LastDispatch {
    pub finished_at: DateTime<Utc>,
    pub report: Option<DispatchReport>,
    pub error: Option<String>,
}

/// Latest outbox run, shared with the health endpoint.
#[derive(Default)]
pub struct DispatcherStatus {
    last: RwLock<Option<LastDispatch>>,
}

impl DispatcherStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn last(&self) -> Option<LastDispatch> {
        self.last.read().await.clone()
    }

    async fn record(&self, result: &Result<DispatchReport, AppError>) {
        *self.last.write().await = Some(LastDispatch {
            finished_at: Utc::now(),
            report: result.as_ref().ok().copied(),
            error: result.as_ref().err().map(ToString::to_string),
        });
    }
}

/// Runs one outbox dispatch per schedule tick.
pub struct ProcessOutboxMessagesJob<O: OutboxRepository> {
    dispatcher: Arc<OutboxDispatcher<O>>,
    status: Arc<DispatcherStatus>,
}

impl<O: OutboxRepository> ProcessOutboxMessagesJob<O> {
    pub fn new(dispatcher: Arc<OutboxDispatcher<O>>, status: Arc<DispatcherStatus>) -> Self {
        Self { dispatcher, status }
    }
}

#[async_trait]
impl<O: OutboxRepository + 'static> Job for ProcessOutboxMessagesJob<O> {
    fn name(&self) -> &str {
        PROCESS_OUTBOX_MESSAGES_JOB
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<(), AppError> {
        let result = self.dispatcher.run_once(cancel).await;
        self.status.record(&result).await;
        result.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::EventBus;
    use crate::application::outbox::DispatcherSettings;
    use crate::domain::repositories::{DispatchLease, MockOutboxRepository};
    use crate::infrastructure::persistence::InMemoryDatabase;
    use serde_json::json;

    struct FreeLease;

    #[async_trait]
    impl DispatchLease for FreeLease {
        async fn release(self: Box<Self>) -> Result<(), AppError> {
            Ok(())
        }
    }

    fn job(mut outbox: MockOutboxRepository, status: Arc<DispatcherStatus>) -> impl Job {
        outbox
            .expect_try_acquire_dispatch_lease()
            .returning(|| Ok(Some(Box::new(FreeLease) as Box<dyn DispatchLease>)));
        let bus = EventBus::builder(Arc::new(InMemoryDatabase::new()))
            .build()
            .unwrap();
        let dispatcher =
            OutboxDispatcher::new(Arc::new(outbox), Arc::new(bus), DispatcherSettings::default());
        ProcessOutboxMessagesJob::new(Arc::new(dispatcher), status)
    }

    #[tokio::test]
    async fn test_records_successful_run() {
        let mut outbox = MockOutboxRepository::new();
        outbox.expect_fetch_unprocessed().returning(|_| Ok(vec![]));
        let status = Arc::new(DispatcherStatus::new());

        job(outbox, status.clone())
            .run(&CancellationToken::new())
            .await
            .unwrap();

        let last = status.last().await.unwrap();
        assert_eq!(last.report, Some(DispatchReport::default()));
        assert!(last.error.is_none());
    }

    #[tokio::test]
    async fn test_records_failed_run() {
        let mut outbox = MockOutboxRepository::new();
        outbox
            .expect_fetch_unprocessed()
            .returning(|_| Err(AppError::internal("Database error", json!({}))));
        let status = Arc::new(DispatcherStatus::new());
        let job = job(outbox, status.clone());

        assert_eq!(job.name(), PROCESS_OUTBOX_MESSAGES_JOB);
        assert!(job.run(&CancellationToken::new()).await.is_err());

        let last = status.last().await.unwrap();
        assert!(last.report.is_none());
        assert_eq!(last.error.as_deref(), Some("Database error"));
    }
}
