//! Fixed-interval job runner for pyre.
//!
//! This crate provides a scheduler that:
//! - Runs one job at startup (optionally) and then once per interval
//! - Never overlaps executions of the same job
//! - Tracks run counts and consecutive failures
//! - Stops on a shutdown signal, interrupting any in-flight execution

mod error;
mod scheduler;
mod types;

pub use error::SchedulerError;
pub use scheduler::{IntervalScheduler, SHUTDOWN_GRACE, ScheduledJob};
pub use types::{JobRecord, JobStatus};
