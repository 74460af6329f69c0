//! Error types for endpoint pools and broadcasting.

use std::time::Duration;

use thiserror::Error;

/// Invalid construction parameters. Fatal at startup, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The endpoint pool was given no endpoints.
    #[error("endpoint pool requires at least one endpoint")]
    EmptyEndpoints,

    /// `max_retries` must be a positive integer.
    #[error("invalid retry count {0}: must be at least 1")]
    InvalidRetryCount(u32),

    /// A broadcast request carried no operations.
    #[error("broadcast request requires at least one operation")]
    EmptyOperations,
}

/// A single submission attempt failed. Recoverable by rotating to another endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    /// The endpoint did not answer within the per-attempt timeout.
    #[error("timed out after {}ms (endpoint: {endpoint})", after.as_millis())]
    Timeout { endpoint: String, after: Duration },

    /// Connection-level failure (refused, reset, DNS, TLS).
    #[error("transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// The remote node answered and refused the transaction.
    #[error("rejected by {endpoint}{}: {message}", code.map(|c| format!(" (code {})", c)).unwrap_or_default())]
    Rejected {
        endpoint: String,
        code: Option<i64>,
        message: String,
    },

    /// The remote node answered with something we could not decode.
    #[error("invalid response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },

    /// The signing capability failed to produce a signed transaction.
    #[error("signing failed: {message}")]
    Signing { message: String },
}

impl SubmissionError {
    /// The endpoint this failure was observed on, if any.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            SubmissionError::Timeout { endpoint, .. }
            | SubmissionError::Transport { endpoint, .. }
            | SubmissionError::Rejected { endpoint, .. }
            | SubmissionError::InvalidResponse { endpoint, .. } => Some(endpoint),
            SubmissionError::Signing { .. } => None,
        }
    }

    /// Short classification label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SubmissionError::Timeout { .. } => "timeout",
            SubmissionError::Transport { .. } => "transport",
            SubmissionError::Rejected { .. } => "rejected",
            SubmissionError::InvalidResponse { .. } => "invalid_response",
            SubmissionError::Signing { .. } => "signing",
        }
    }
}

/// Every permitted attempt failed, or a single-endpoint pool failed once.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("broadcast failed after {attempts} attempt(s): {last_error}")]
pub struct ExhaustedError {
    /// Number of attempts made before giving up.
    pub attempts: u32,
    /// The error from the final attempt.
    #[source]
    pub last_error: SubmissionError,
}

/// A broadcast was abandoned because shutdown was requested.
///
/// Whether the transaction reached the ledger is unknown. Callers on the
/// shutdown path must not retry it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("broadcast interrupted during attempt {attempt} (endpoint: {endpoint})")]
pub struct BroadcastInterrupted {
    /// Attempt that was in progress (or about to start) when cancelled.
    pub attempt: u32,
    /// Endpoint the attempt was bound to.
    pub endpoint: String,
}
