//! Error types for the Steem client.

use std::time::Duration;

use pyre_broadcast::SubmissionError;
use thiserror::Error;

/// Errors that can occur when talking to a Steem node.
#[derive(Debug, Error)]
pub enum SteemError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON-RPC error object returned by the node.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Rate limited.
    #[error("rate limited{}", match retry_after_secs {
        Some(secs) => format!(" (retry after {}s)", secs),
        None => String::new(),
    })]
    RateLimited {
        /// Seconds to wait before retrying (from Retry-After header, optional).
        retry_after_secs: Option<u64>,
    },

    /// Invalid response from server.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The external signer failed.
    #[error(transparent)]
    Signer(#[from] SignerError),
}

impl SteemError {
    /// Classify this error as a failed submission against `endpoint`.
    ///
    /// `timeout` is the HTTP client's request timeout, reported when reqwest
    /// gives up before the broadcaster's own per-attempt bound does.
    pub fn into_submission_error(self, endpoint: &str, timeout: Duration) -> SubmissionError {
        let endpoint = endpoint.to_string();
        match self {
            SteemError::Http(e) if e.is_timeout() => SubmissionError::Timeout {
                endpoint,
                after: timeout,
            },
            SteemError::Http(e) if e.is_decode() => SubmissionError::InvalidResponse {
                endpoint,
                message: e.to_string(),
            },
            SteemError::Http(e) => SubmissionError::Transport {
                endpoint,
                message: e.to_string(),
            },
            SteemError::Json(e) => SubmissionError::InvalidResponse {
                endpoint,
                message: e.to_string(),
            },
            SteemError::InvalidResponse(message) => {
                SubmissionError::InvalidResponse { endpoint, message }
            }
            SteemError::Rpc { code, message } => SubmissionError::Rejected {
                endpoint,
                code: Some(code),
                message,
            },
            e @ SteemError::RateLimited { .. } => SubmissionError::Rejected {
                endpoint,
                code: Some(429),
                message: e.to_string(),
            },
            SteemError::Signer(e) => SubmissionError::Signing {
                message: e.to_string(),
            },
        }
    }
}

/// Errors from the external signing process.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("signer not found: {0}")]
    NotFound(String),

    #[error("signer timed out after {0}ms")]
    Timeout(u64),

    #[error("signer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("invalid signer output: {0}")]
    InvalidOutput(String),
}
