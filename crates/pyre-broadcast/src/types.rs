//! Request, policy, and outcome types for broadcasting.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigurationError, ExhaustedError, SubmissionError};

/// Default number of attempts per broadcast.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default wait between a rotation and the next attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Default bound on a single network submission.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Immutable retry configuration for a broadcaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastPolicy {
    max_retries: u32,
    retry_delay: Duration,
    attempt_timeout: Duration,
}

impl BroadcastPolicy {
    /// Build a policy, rejecting a zero retry count up front.
    pub fn new(
        max_retries: u32,
        retry_delay: Duration,
        attempt_timeout: Duration,
    ) -> Result<Self, ConfigurationError> {
        if max_retries == 0 {
            return Err(ConfigurationError::InvalidRetryCount(max_retries));
        }

        Ok(Self {
            max_retries,
            retry_delay,
            attempt_timeout,
        })
    }

    /// Total attempts allowed per broadcast, including the first.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }
}

impl Default for BroadcastPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

/// A ready-to-send batch of operations and the credential to sign it with.
///
/// Operations are opaque here; the submitter decides what they mean.
#[derive(Debug, Clone)]
pub struct BroadcastRequest<Op, Cred> {
    operations: Vec<Op>,
    credential: Cred,
}

impl<Op, Cred> BroadcastRequest<Op, Cred> {
    /// Create a request. The credential must already be validated by the caller.
    pub fn new(operations: Vec<Op>, credential: Cred) -> Result<Self, ConfigurationError> {
        if operations.is_empty() {
            return Err(ConfigurationError::EmptyOperations);
        }

        Ok(Self {
            operations,
            credential,
        })
    }

    pub fn operations(&self) -> &[Op] {
        &self.operations
    }

    pub fn credential(&self) -> &Cred {
        &self.credential
    }
}

/// Opaque confirmation returned by the remote service (a transaction id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Confirmation(String);

impl Confirmation {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Confirmation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a single attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Confirmed(Confirmation),
    Failed(SubmissionError),
}

/// One try inside a broadcast call. Lives only for that call.
#[derive(Debug, Clone)]
pub struct SubmissionAttempt {
    /// 1-based attempt number.
    pub number: u32,
    /// Endpoint the attempt was bound to.
    pub endpoint: String,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

impl SubmissionAttempt {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Confirmed(_))
    }
}

/// Terminal result of a broadcast call.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a broadcast outcome reports whether the transaction was accepted"]
pub enum BroadcastOutcome {
    /// An endpoint accepted the transaction.
    Success {
        confirmation: Confirmation,
        attempts: u32,
    },
    /// Retries were exhausted, or there was no alternate endpoint.
    Failure {
        last_error: SubmissionError,
        attempts: u32,
    },
}

impl BroadcastOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BroadcastOutcome::Success { .. })
    }

    /// Number of attempts the call made.
    pub fn attempts(&self) -> u32 {
        match self {
            BroadcastOutcome::Success { attempts, .. } | BroadcastOutcome::Failure { attempts, .. } => {
                *attempts
            }
        }
    }

    /// Convert into a `Result` for callers that want `?`.
    pub fn into_result(self) -> Result<Confirmation, ExhaustedError> {
        match self {
            BroadcastOutcome::Success { confirmation, .. } => Ok(confirmation),
            BroadcastOutcome::Failure {
                last_error,
                attempts,
            } => Err(ExhaustedError {
                attempts,
                last_error,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults() {
        let policy = BroadcastPolicy::default();
        assert_eq!(policy.max_retries(), 3);
        assert_eq!(policy.retry_delay(), Duration::from_secs(2));
        assert_eq!(policy.attempt_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_policy_rejects_zero_retries() {
        let result = BroadcastPolicy::new(0, Duration::from_secs(2), Duration::from_secs(10));
        assert_eq!(result.unwrap_err(), ConfigurationError::InvalidRetryCount(0));
    }

    #[test]
    fn test_policy_allows_zero_delay() {
        let policy = BroadcastPolicy::new(1, Duration::ZERO, Duration::from_secs(1)).unwrap();
        assert_eq!(policy.retry_delay(), Duration::ZERO);
    }

    #[test]
    fn test_request_rejects_empty_operations() {
        let result = BroadcastRequest::<u8, ()>::new(vec![], ());
        assert_eq!(result.unwrap_err(), ConfigurationError::EmptyOperations);
    }

    #[test]
    fn test_request_keeps_operation_order() {
        let request = BroadcastRequest::new(vec!["comment", "comment_options", "vote"], "key").unwrap();
        assert_eq!(request.operations(), &["comment", "comment_options", "vote"]);
        assert_eq!(*request.credential(), "key");
    }

    #[test]
    fn test_confirmation_serializes_transparently() {
        let confirmation: Confirmation = serde_json::from_str("\"abc123\"").unwrap();
        assert_eq!(confirmation.as_str(), "abc123");
        assert_eq!(confirmation.to_string(), "abc123");
    }

    #[test]
    fn test_outcome_into_result() {
        let ok = BroadcastOutcome::Success {
            confirmation: Confirmation::new("tx1"),
            attempts: 2,
        };
        assert!(ok.is_success());
        assert_eq!(ok.attempts(), 2);
        assert_eq!(ok.into_result().unwrap(), Confirmation::new("tx1"));

        let failed = BroadcastOutcome::Failure {
            last_error: SubmissionError::Signing {
                message: "no key".to_string(),
            },
            attempts: 1,
        };
        let err = failed.into_result().unwrap_err();
        assert_eq!(err.attempts, 1);
    }
}
