//! Error types for the scheduler.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when configuring the scheduler.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// Interval must be positive.
    #[error("invalid interval: {0:?} (must be greater than zero)")]
    InvalidInterval(Duration),
}
