use chrono::{DateTime, Utc};
use cron::Schedule;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Job, JobSettings};
use crate::error::AppError;

struct ScheduledJob {
    job: Arc<dyn Job>,
    schedule: Schedule,
}

/// Runs registered jobs on their cron schedules until cancelled.
#[derive(Default)]
pub struct JobHost {
    jobs: Vec<ScheduledJob>,
}

impl JobHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `job` under `settings`. Disabled jobs are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] for an invalid cron expression.
    pub fn register(&mut self, job: Arc<dyn Job>, settings: &JobSettings) -> Result<(), AppError> {
        if !settings.enabled {
            info!(job = %settings.name, "Job disabled, not scheduling");
            return Ok(());
        }

        let schedule = Schedule::from_str(&settings.schedule).map_err(|e| {
            AppError::bad_request(
                "Invalid job schedule",
                json!({ "job": settings.name, "schedule": settings.schedule, "reason": e.to_string() }),
            )
        })?;

        info!(job = %settings.name, schedule = %settings.schedule, "Job scheduled");
        self.jobs.push(ScheduledJob { job, schedule });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Spawns one task per job. The tasks finish once `cancel` fires and any
    /// run in progress returns.
    pub fn spawn(self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        self.jobs
            .into_iter()
            .map(|scheduled| tokio::spawn(run_schedule(scheduled, cancel.clone())))
            .collect()
    }
}

async fn run_schedule(scheduled: ScheduledJob, cancel: CancellationToken) {
    let name = scheduled.job.name().to_string();
    let mut last_fire: DateTime<Utc> = Utc::now();

    loop {
        let Some(next) = scheduled.schedule.after(&last_fire.max(Utc::now())).next() else {
            warn!(job = %name, "Schedule has no upcoming fire time, stopping");
            return;
        };
        let delay = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(job = %name, "Job loop stopped");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
        last_fire = next;

        let started = tokio::time::Instant::now();
        match scheduled.job.run(&cancel).await {
            Ok(()) => debug!(job = %name, elapsed_ms = started.elapsed().as_millis() as u64, "Job run finished"),
            Err(e) => error!(job = %name, error = %e, "Job run failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        runs: AtomicUsize,
        in_flight: AtomicUsize,
        overlapped: AtomicUsize,
    }

    #[async_trait]
    impl Job for Counter {
        fn name(&self) -> &str {
            "Counter"
        }

        async fn run(&self, _cancel: &CancellationToken) -> Result<(), AppError> {
            if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlapped.fetch_add(1, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(1500)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counter() -> Arc<Counter> {
        Arc::new(Counter {
            runs: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            overlapped: AtomicUsize::new(0),
        })
    }

    fn settings(enabled: bool, schedule: &str) -> JobSettings {
        JobSettings {
            name: "Counter".to_string(),
            enabled,
            schedule: schedule.to_string(),
        }
    }

    #[test]
    fn test_disabled_job_is_not_registered() {
        let mut host = JobHost::new();
        host.register(counter(), &settings(false, "* * * * * *")).unwrap();

        assert!(host.is_empty());
    }

    #[test]
    fn test_invalid_schedule_is_rejected() {
        let mut host = JobHost::new();
        let err = host
            .register(counter(), &settings(true, "every ten seconds"))
            .unwrap_err();

        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_repeatedly_without_overlap() {
        let job = counter();
        let mut host = JobHost::new();
        host.register(job.clone(), &settings(true, "* * * * * *")).unwrap();
        assert_eq!(host.len(), 1);

        let cancel = CancellationToken::new();
        let handles = host.spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(10)).await;
        cancel.cancel();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(job.runs.load(Ordering::SeqCst) >= 2);
        assert_eq!(job.overlapped.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_idle_loop() {
        let job = counter();
        let mut host = JobHost::new();
        host.register(job.clone(), &settings(true, "0 0 0 1 1 *")).unwrap();

        let cancel = CancellationToken::new();
        let handles = host.spawn(cancel.clone());
        cancel.cancel();

        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .unwrap()
                .unwrap();
        }
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }
}
