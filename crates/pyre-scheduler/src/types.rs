//! Scheduler types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current status of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its next tick.
    #[default]
    Pending,
    /// Currently executing.
    Running,
    /// Last execution succeeded.
    Succeeded,
    /// Last execution failed with an error.
    Failed { error: String },
    /// Shutdown arrived while the job was executing.
    Interrupted,
}

/// Bookkeeping for a recurring job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Human-readable name for the job.
    pub name: String,
    /// Current status of the job.
    pub status: JobStatus,
    /// Number of executions started.
    pub runs: u64,
    /// Number of consecutive failures (resets on success).
    pub failure_count: u32,
    /// When the most recent execution started.
    pub last_run: Option<DateTime<Utc>>,
    /// When the next execution is expected to start.
    pub next_run: Option<DateTime<Utc>>,
    /// When this record was created.
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: JobStatus::Pending,
            runs: 0,
            failure_count: 0,
            last_run: None,
            next_run: None,
            created_at: Utc::now(),
        }
    }

    /// Mark the start of an execution.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.runs += 1;
        self.last_run = Some(now);
    }

    /// Record a successful execution.
    pub fn succeed(&mut self, next_run: DateTime<Utc>) {
        self.status = JobStatus::Succeeded;
        self.failure_count = 0;
        self.next_run = Some(next_run);
    }

    /// Record a failed execution. The job still runs at its next tick.
    pub fn fail(&mut self, error: impl Into<String>, next_run: DateTime<Utc>) {
        self.status = JobStatus::Failed {
            error: error.into(),
        };
        self.failure_count += 1;
        self.next_run = Some(next_run);
    }

    /// Record an execution cut short by shutdown. Nothing is scheduled after it.
    pub fn interrupt(&mut self) {
        self.status = JobStatus::Interrupted;
        self.next_run = None;
    }

    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }
}
