//! Background jobs run on cron schedules.
//!
//! Jobs are declared in configuration as [`JobSettings`] and driven by a
//! [`JobHost`]. Each job runs on its own task and never overlaps itself.

mod host;
mod process_outbox;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;

pub use host::JobHost;
pub use process_outbox::{
    DispatcherStatus, LastDispatch, PROCESS_OUTBOX_MESSAGES_JOB, ProcessOutboxMessagesJob,
};

/// Schedule of the outbox job when none is configured: every 10 seconds.
pub const DEFAULT_OUTBOX_SCHEDULE: &str = "0/10 * * * * *";

/// One entry of the `JOBS` configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSettings {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Six-field cron expression, seconds first.
    pub schedule: String,
}

fn default_enabled() -> bool {
    true
}

impl JobSettings {
    pub fn default_jobs() -> Vec<JobSettings> {
        vec![JobSettings {
            name: PROCESS_OUTBOX_MESSAGES_JOB.to_string(),
            enabled: true,
            schedule: DEFAULT_OUTBOX_SCHEDULE.to_string(),
        }]
    }
}

#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    /// Runs once. `cancel` fires on shutdown.
    async fn run(&self, cancel: &CancellationToken) -> Result<(), AppError>;
}
