//! Interval scheduler implementation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

use crate::{JobRecord, SchedulerError};

/// How long an execution may keep running after shutdown is requested.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A unit of recurring work.
#[async_trait]
pub trait ScheduledJob: Send {
    fn name(&self) -> &str;

    /// Execute once. `shutdown` flips to `true` when the process is stopping.
    async fn run(&mut self, shutdown: watch::Receiver<bool>) -> Result<(), String>;
}

/// Runs a single job at a fixed interval until shutdown.
#[derive(Debug, Clone)]
pub struct IntervalScheduler {
    interval: Duration,
    run_immediately: bool,
}

impl IntervalScheduler {
    pub fn new(interval: Duration) -> Result<Self, SchedulerError> {
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInterval(interval));
        }
        Ok(Self {
            interval,
            run_immediately: true,
        })
    }

    /// Whether the first execution happens at startup or one interval later.
    pub fn run_immediately(mut self, run_immediately: bool) -> Self {
        self.run_immediately = run_immediately;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run the scheduler loop and return the job's final record.
    #[tracing::instrument(skip_all, fields(job = %job.name()))]
    pub async fn run<J: ScheduledJob>(
        &self,
        mut job: J,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JobRecord {
        let mut record = JobRecord::new(job.name());
        let job_shutdown = shutdown_rx.clone();

        let first = if self.run_immediately {
            Instant::now()
        } else {
            Instant::now() + self.interval
        };
        let mut ticker = interval_at(first, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let until_first = first.saturating_duration_since(Instant::now());
        record.next_run = Some(Utc::now() + chrono_interval(until_first));
        info!(
            interval_secs = self.interval.as_secs_f64(),
            next_run = ?record.next_run,
            "scheduler starting"
        );

        let shutdown = wait_for_shutdown(&mut shutdown_rx);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("scheduler received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let started = Utc::now();
            record.start(started);
            let next_run = started + chrono_interval(self.interval);
            info!(run = record.runs, "executing job");

            let execution = job.run(job_shutdown.clone());
            tokio::pin!(execution);

            let result = tokio::select! {
                biased;
                _ = &mut shutdown => None,
                result = &mut execution => Some(result),
            };

            match result {
                Some(Ok(())) => {
                    record.succeed(next_run);
                    debug!(run = record.runs, next_run = %next_run, "job succeeded");
                }
                Some(Err(e)) => {
                    record.fail(e.clone(), next_run);
                    warn!(
                        run = record.runs,
                        failure_count = record.failure_count,
                        next_run = %next_run,
                        error = %e,
                        "job failed, will run again at next tick"
                    );
                }
                None => {
                    warn!(run = record.runs, "shutdown requested during execution");
                    match tokio::time::timeout(SHUTDOWN_GRACE, &mut execution).await {
                        Ok(Ok(())) => info!("in-flight execution finished during shutdown"),
                        Ok(Err(e)) => info!(error = %e, "in-flight execution stopped"),
                        Err(_) => error!(
                            grace_secs = SHUTDOWN_GRACE.as_secs(),
                            "in-flight execution abandoned"
                        ),
                    }
                    record.interrupt();
                    break;
                }
            }
        }

        info!(runs = record.runs, status = ?record.status, "scheduler shut down gracefully");
        record
    }
}

fn chrono_interval(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Resolves once shutdown is requested. A dropped sender never resolves.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        let requested = *rx.borrow_and_update();
        if requested {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
