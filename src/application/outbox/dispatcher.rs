//! Delivery of stored outbox messages to the event bus.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_retry::Retry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::events::EventBus;
use crate::domain::entities::OutboxMessage;
use crate::domain::repositories::OutboxRepository;
use crate::error::AppError;

pub const DEFAULT_BATCH_SIZE: i64 = 10;
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_RETRY_STEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// Messages fetched per run.
    pub batch_size: i64,
    /// Publish attempts per message, including the first.
    pub max_attempts: usize,
    /// Delay before retry `n` is `n * retry_step`.
    pub retry_step: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_step: DEFAULT_RETRY_STEP,
        }
    }
}

/// Outcome of one dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub fetched: usize,
    pub delivered: usize,
    pub failed: usize,
    pub undecodable: usize,
    /// The run did nothing because another dispatcher held the lease.
    pub skipped: bool,
}

impl DispatchReport {
    /// Messages marked processed by the run.
    pub fn processed(&self) -> usize {
        self.delivered + self.failed + self.undecodable
    }
}

/// Linear backoff between publish attempts: `step, 2*step, ...`.
pub fn retry_delays(step: Duration, max_attempts: usize) -> impl Iterator<Item = Duration> {
    (1..max_attempts as u32).map(move |n| step * n)
}

/// Publishes unprocessed outbox messages, oldest first.
///
/// Every fetched message that the run reaches is marked processed, with an
/// error recorded when decoding or every publish attempt failed. Messages are
/// never retried by later runs; see [`OutboxRepository::requeue`].
///
/// Runs are serialized through the store's dispatch lease, so dispatchers in
/// different processes sharing one database never overlap.
pub struct OutboxDispatcher<O: OutboxRepository> {
    outbox: Arc<O>,
    bus: Arc<EventBus>,
    settings: DispatcherSettings,
}

impl<O: OutboxRepository> OutboxDispatcher<O> {
    pub fn new(outbox: Arc<O>, bus: Arc<EventBus>, settings: DispatcherSettings) -> Self {
        Self {
            outbox,
            bus,
            settings,
        }
    }

    /// Processes one batch.
    ///
    /// Returns a skipped report if another dispatcher holds the lease.
    /// Cancellation is checked before each message; messages handled so far
    /// are still saved.
    ///
    /// # Errors
    ///
    /// Returns repository errors from the lease, fetching or saving the batch.
    /// Handler failures are recorded on the message instead.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<DispatchReport, AppError> {
        let Some(lease) = self.outbox.try_acquire_dispatch_lease().await? else {
            warn!("Outbox dispatch already in progress, skipping run");
            return Ok(DispatchReport {
                skipped: true,
                ..DispatchReport::default()
            });
        };

        let result = self.dispatch_batch(cancel).await;

        if let Err(e) = lease.release().await {
            warn!(error = %e, "Failed to release outbox dispatch lease");
        }

        result
    }

    async fn dispatch_batch(&self, cancel: &CancellationToken) -> Result<DispatchReport, AppError> {
        let messages = self
            .outbox
            .fetch_unprocessed(self.settings.batch_size)
            .await?;

        let mut report = DispatchReport {
            fetched: messages.len(),
            ..DispatchReport::default()
        };
        metrics::histogram!("outbox_dispatch_batch_size").record(messages.len() as f64);

        if messages.is_empty() {
            debug!("No outbox messages to dispatch");
            return Ok(report);
        }

        let mut processed = Vec::with_capacity(messages.len());

        for mut message in messages {
            if cancel.is_cancelled() {
                info!(
                    remaining = report.fetched - processed.len(),
                    "Outbox dispatch cancelled"
                );
                break;
            }

            let (outcome, error) = match self.deliver(&message).await {
                Outcome::Delivered => {
                    report.delivered += 1;
                    ("delivered", None)
                }
                Outcome::Failed(e) => {
                    report.failed += 1;
                    ("failed", Some(e))
                }
                Outcome::Undecodable(e) => {
                    report.undecodable += 1;
                    ("undecodable", Some(e))
                }
            };
            metrics::counter!("outbox_messages_total", "outcome" => outcome).increment(1);

            message.mark_processed(Utc::now(), error);
            processed.push(message);
        }

        if !processed.is_empty() {
            self.outbox.save_processed(&processed).await?;
        }

        info!(
            fetched = report.fetched,
            delivered = report.delivered,
            failed = report.failed,
            undecodable = report.undecodable,
            "Outbox dispatch finished"
        );

        Ok(report)
    }

    async fn deliver(&self, message: &OutboxMessage) -> Outcome {
        let event = match message.decode() {
            Ok(event) => event,
            Err(e) => {
                error!(
                    message_id = %message.id,
                    event_type = %message.event_type,
                    error = %e,
                    "Failed to decode outbox message"
                );
                return Outcome::Undecodable(format!("deserialization failed: {e}"));
            }
        };

        let bus = &self.bus;
        let event = &event;
        let attempt = AtomicUsize::new(0);
        let attempt = &attempt;
        let strategy = retry_delays(self.settings.retry_step, self.settings.max_attempts);

        let result = Retry::start(strategy, move || async move {
            let n = attempt.fetch_add(1, Ordering::SeqCst) + 1;
            let result = bus.publish(event).await;
            if let Err(e) = &result {
                warn!(
                    message_id = %event.id,
                    attempt = n,
                    error = %e,
                    "Outbox message publish attempt failed"
                );
            }
            result
        })
        .await;

        match result {
            Ok(()) => {
                debug!(message_id = %message.id, "Outbox message delivered");
                Outcome::Delivered
            }
            Err(e) => {
                error!(
                    message_id = %message.id,
                    attempts = attempt.load(Ordering::SeqCst),
                    error = %e,
                    "Outbox message delivery failed"
                );
                Outcome::Failed(e.to_string())
            }
        }
    }
}

enum Outcome {
    Delivered,
    Failed(String),
    Undecodable(String),
}
