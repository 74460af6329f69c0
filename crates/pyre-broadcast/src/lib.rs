//! Node-failover broadcast core for pyre.
//!
//! This crate submits a batch of operations to a remote ledger through a
//! fixed pool of fallback endpoints:
//!
//! - **EndpointPool**: ordered, cyclic endpoint list with a rotation cursor
//! - **TransactionBroadcaster**: bounded, sequential retry loop that rotates
//!   endpoints on failure and returns a typed outcome
//! - **Submitter**: the seam where signing and the wire protocol plug in
//!
//! The broadcaster never races endpoints against each other. Submitting the
//! same non-idempotent transaction twice in parallel is exactly what it avoids.

mod broadcaster;
mod error;
mod pool;
mod types;

pub use broadcaster::{Submitter, TransactionBroadcaster};
pub use error::{BroadcastInterrupted, ConfigurationError, ExhaustedError, SubmissionError};
pub use pool::{EndpointPool, Rotation};
pub use types::{
    AttemptOutcome, BroadcastOutcome, BroadcastPolicy, BroadcastRequest, Confirmation,
    DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, SubmissionAttempt,
};
