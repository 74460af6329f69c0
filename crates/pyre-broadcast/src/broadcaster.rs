//! Bounded-retry transaction broadcasting with endpoint failover.
//!
//! A broadcast call walks this state machine:
//!
//! ```text
//! Init -> Attempting(1) -> Succeeded
//!                       -> Attempting(2) -> ...
//!                       -> Failed
//! ```
//!
//! Attempts are strictly sequential. A failed attempt rotates the pool and
//! pays the retry delay once, unless it was the last permitted attempt or the
//! pool has no alternate endpoint, in which case the call fails immediately.

use std::future::Future;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{Instant, sleep, timeout};
use tracing::{info, warn};

use crate::{
    AttemptOutcome, BroadcastInterrupted, BroadcastOutcome, BroadcastPolicy, BroadcastRequest,
    Confirmation, EndpointPool, SubmissionAttempt, SubmissionError,
};

/// Capability that signs and submits a batch of operations to one endpoint.
///
/// Implementations bind to whatever endpoint they are handed; the
/// broadcaster decides which one and when to move on.
#[async_trait]
pub trait Submitter: Send + Sync {
    /// Operation type carried by a request. Opaque to the broadcaster.
    type Operation: Send + Sync;
    /// Signing credential. Opaque to the broadcaster.
    type Credential: Send + Sync;

    /// Sign and submit `operations` to `endpoint`.
    async fn submit(
        &self,
        endpoint: &str,
        operations: &[Self::Operation],
        credential: &Self::Credential,
    ) -> Result<Confirmation, SubmissionError>;
}

/// Submits requests through an [`EndpointPool`], rotating on failure.
///
/// `broadcast` takes `&mut self`: at most one broadcast may be in flight per
/// broadcaster, since the pool cursor has no other protection.
pub struct TransactionBroadcaster<S> {
    pool: EndpointPool,
    policy: BroadcastPolicy,
    submitter: S,
}

impl<S: Submitter> TransactionBroadcaster<S> {
    pub fn new(pool: EndpointPool, policy: BroadcastPolicy, submitter: S) -> Self {
        Self {
            pool,
            policy,
            submitter,
        }
    }

    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    pub fn policy(&self) -> &BroadcastPolicy {
        &self.policy
    }

    pub fn submitter(&self) -> &S {
        &self.submitter
    }

    /// Broadcast `request`, retrying across endpoints up to the policy bound.
    ///
    /// Ordinary submission failures are reported as
    /// [`BroadcastOutcome::Failure`], never as `Err`. `Err` means shutdown
    /// was requested while a submission or retry delay was pending; the
    /// transaction's fate is then unknown.
    #[tracing::instrument(skip_all, fields(operations = request.operations().len()))]
    pub async fn broadcast(
        &mut self,
        request: &BroadcastRequest<S::Operation, S::Credential>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<BroadcastOutcome, BroadcastInterrupted> {
        let max_retries = self.policy.max_retries();
        let mut cancelled = std::pin::pin!(shutdown_requested(shutdown));
        let mut attempt: u32 = 1;

        loop {
            let endpoint = self.pool.current().to_string();
            info!(attempt, max_retries, endpoint = %endpoint, "submitting transaction");

            let started = Instant::now();
            let result = tokio::select! {
                biased;

                _ = cancelled.as_mut() => {
                    warn!(attempt, endpoint = %endpoint, "shutdown requested, abandoning in-flight broadcast");
                    return Err(BroadcastInterrupted { attempt, endpoint: endpoint.clone() });
                }

                result = self.submit_once(&endpoint, request) => result,
            };

            let record = SubmissionAttempt {
                number: attempt,
                endpoint,
                outcome: match result {
                    Ok(confirmation) => AttemptOutcome::Confirmed(confirmation),
                    Err(error) => AttemptOutcome::Failed(error),
                },
                elapsed: started.elapsed(),
            };

            let last_error = match record.outcome {
                AttemptOutcome::Confirmed(confirmation) => {
                    info!(
                        attempt,
                        endpoint = %record.endpoint,
                        elapsed_ms = record.elapsed.as_millis() as u64,
                        confirmation = %confirmation,
                        "transaction accepted"
                    );
                    return Ok(BroadcastOutcome::Success {
                        confirmation,
                        attempts: attempt,
                    });
                }
                AttemptOutcome::Failed(error) => {
                    warn!(
                        attempt,
                        max_retries,
                        endpoint = %record.endpoint,
                        elapsed_ms = record.elapsed.as_millis() as u64,
                        kind = error.kind(),
                        error = %error,
                        "broadcast attempt failed"
                    );
                    error
                }
            };

            if attempt >= max_retries {
                warn!(attempts = attempt, error = %last_error, "broadcast retries exhausted");
                return Ok(BroadcastOutcome::Failure {
                    last_error,
                    attempts: attempt,
                });
            }

            let rotation = self.pool.rotate();
            if !rotation.rotated {
                warn!(
                    attempts = attempt,
                    endpoint = %record.endpoint,
                    "no alternate endpoint available, giving up"
                );
                return Ok(BroadcastOutcome::Failure {
                    last_error,
                    attempts: attempt,
                });
            }
            let next_endpoint = rotation.endpoint.to_string();

            let delay = self.policy.retry_delay();
            info!(
                from = %record.endpoint,
                to = %next_endpoint,
                delay_ms = delay.as_millis() as u64,
                "switching endpoint before retry"
            );

            attempt += 1;
            tokio::select! {
                biased;

                _ = cancelled.as_mut() => {
                    warn!(attempt, endpoint = %next_endpoint, "shutdown requested during retry delay");
                    return Err(BroadcastInterrupted { attempt, endpoint: next_endpoint });
                }

                _ = sleep(delay) => {}
            }
        }
    }

    /// One submission bounded by the per-attempt timeout.
    async fn submit_once(
        &self,
        endpoint: &str,
        request: &BroadcastRequest<S::Operation, S::Credential>,
    ) -> Result<Confirmation, SubmissionError> {
        let limit = self.policy.attempt_timeout();
        let submission = self
            .submitter
            .submit(endpoint, request.operations(), request.credential());

        match timeout(limit, submission).await {
            Ok(result) => result,
            Err(_) => Err(SubmissionError::Timeout {
                endpoint: endpoint.to_string(),
                after: limit,
            }),
        }
    }
}

/// Resolves once the shutdown flag is set. Never resolves if the sender is gone.
fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) -> impl Future<Output = ()> + '_ {
    async move {
        loop {
            let requested = *shutdown.borrow_and_update();
            if requested {
                return;
            }
            if shutdown.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use proptest::prelude::*;

    /// Scripted submitter: pops one result per call, fails once the script runs out.
    #[derive(Default)]
    struct ScriptedSubmitter {
        script: Mutex<VecDeque<Result<Confirmation, SubmissionError>>>,
        calls: Mutex<Vec<String>>,
        hang: bool,
    }

    impl ScriptedSubmitter {
        fn with_script(script: Vec<Result<Confirmation, SubmissionError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            }
        }

        fn hanging() -> Self {
            Self {
                hang: true,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Submitter for ScriptedSubmitter {
        type Operation = &'static str;
        type Credential = &'static str;

        async fn submit(
            &self,
            endpoint: &str,
            _operations: &[Self::Operation],
            _credential: &Self::Credential,
        ) -> Result<Confirmation, SubmissionError> {
            self.calls.lock().unwrap().push(endpoint.to_string());
            if self.hang {
                std::future::pending::<()>().await;
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Err(refused(endpoint)))
        }
    }

    fn refused(endpoint: &str) -> SubmissionError {
        SubmissionError::Transport {
            endpoint: endpoint.to_string(),
            message: "connection refused".to_string(),
        }
    }

    fn policy(max_retries: u32) -> BroadcastPolicy {
        BroadcastPolicy::new(max_retries, Duration::from_secs(2), Duration::from_secs(10)).unwrap()
    }

    fn request() -> BroadcastRequest<&'static str, &'static str> {
        BroadcastRequest::new(vec!["comment", "comment_options"], "5Kkey").unwrap()
    }

    fn broadcaster(
        endpoints: &[&str],
        max_retries: u32,
        submitter: ScriptedSubmitter,
    ) -> TransactionBroadcaster<ScriptedSubmitter> {
        let pool = EndpointPool::new(endpoints.iter().copied()).unwrap();
        TransactionBroadcaster::new(pool, policy(max_retries), submitter)
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_makes_exactly_max_attempts() {
        let (_tx, mut rx) = watch::channel(false);
        let mut b = broadcaster(&["A", "B", "C"], 3, ScriptedSubmitter::default());

        let started = tokio::time::Instant::now();
        let outcome = b.broadcast(&request(), &mut rx).await.unwrap();

        assert!(!outcome.is_success());
        assert_eq!(outcome.attempts(), 3);
        assert_eq!(b.submitter().calls(), vec!["A", "B", "C"]);
        // Two rotations (after attempts 1 and 2), none after the last.
        assert_eq!(b.pool().current(), "C");
        // One delay per rotation.
        assert_eq!(started.elapsed(), Duration::from_secs(4));
        match outcome {
            BroadcastOutcome::Failure { last_error, .. } => {
                assert_eq!(last_error.endpoint(), Some("C"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_second_attempt_stops() {
        let (_tx, mut rx) = watch::channel(false);
        let submitter = ScriptedSubmitter::with_script(vec![
            Err(refused("A")),
            Ok(Confirmation::new("tx-from-b")),
        ]);
        let mut b = broadcaster(&["A", "B", "C"], 3, submitter);

        let started = tokio::time::Instant::now();
        let outcome = b.broadcast(&request(), &mut rx).await.unwrap();

        assert_eq!(
            outcome,
            BroadcastOutcome::Success {
                confirmation: Confirmation::new("tx-from-b"),
                attempts: 2,
            }
        );
        assert_eq!(b.submitter().calls(), vec!["A", "B"]);
        assert_eq!(b.pool().current(), "B");
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_endpoint_fails_fast() {
        let (_tx, mut rx) = watch::channel(false);
        let mut b = broadcaster(&["only"], 3, ScriptedSubmitter::default());

        let started = tokio::time::Instant::now();
        let outcome = b.broadcast(&request(), &mut rx).await.unwrap();

        assert!(!outcome.is_success());
        assert_eq!(outcome.attempts(), 1);
        assert_eq!(b.submitter().calls(), vec!["only"]);
        assert_eq!(b.pool().index(), 0);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_fail_fail_succeed_leaves_cursor_on_last() {
        let (_tx, mut rx) = watch::channel(false);
        let submitter = ScriptedSubmitter::with_script(vec![
            Err(refused("A")),
            Err(refused("B")),
            Ok(Confirmation::new("tx-from-c")),
        ]);
        let mut b = broadcaster(&["A", "B", "C"], 3, submitter);

        let outcome = b.broadcast(&request(), &mut rx).await.unwrap();

        assert_eq!(outcome.into_result().unwrap(), Confirmation::new("tx-from-c"));
        assert_eq!(b.submitter().calls(), vec!["A", "B", "C"]);
        assert_eq!(b.pool().current(), "C");
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success_has_no_rotation_or_delay() {
        let (_tx, mut rx) = watch::channel(false);
        let submitter = ScriptedSubmitter::with_script(vec![Ok(Confirmation::new("tx"))]);
        let mut b = broadcaster(&["A", "B"], 3, submitter);

        let started = tokio::time::Instant::now();
        let outcome = b.broadcast(&request(), &mut rx).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(b.pool().current(), "A");
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cursor_persists_across_calls() {
        let (_tx, mut rx) = watch::channel(false);
        let submitter = ScriptedSubmitter::with_script(vec![
            Err(refused("A")),
            Ok(Confirmation::new("first")),
            Ok(Confirmation::new("second")),
        ]);
        let mut b = broadcaster(&["A", "B", "C"], 3, submitter);

        let first = b.broadcast(&request(), &mut rx).await.unwrap();
        let second = b.broadcast(&request(), &mut rx).await.unwrap();

        assert!(first.is_success());
        assert!(second.is_success());
        // The second call starts where the first left off.
        assert_eq!(b.submitter().calls(), vec!["A", "B", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let (_tx, mut rx) = watch::channel(false);
        let pool = EndpointPool::new(["A", "B"]).unwrap();
        let policy =
            BroadcastPolicy::new(2, Duration::from_secs(2), Duration::from_secs(10)).unwrap();
        let mut b = TransactionBroadcaster::new(pool, policy, ScriptedSubmitter::hanging());

        let started = tokio::time::Instant::now();
        let outcome = b.broadcast(&request(), &mut rx).await.unwrap();

        assert_eq!(outcome.attempts(), 2);
        // 10s timeout + 2s delay + 10s timeout.
        assert_eq!(started.elapsed(), Duration::from_secs(22));
        match outcome {
            BroadcastOutcome::Failure { last_error, .. } => assert_eq!(
                last_error,
                SubmissionError::Timeout {
                    endpoint: "B".to_string(),
                    after: Duration::from_secs(10),
                }
            ),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_in_flight_submission() {
        let (tx, mut rx) = watch::channel(false);
        let mut b = broadcaster(&["A", "B"], 3, ScriptedSubmitter::hanging());

        let signal = tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            let _ = tx.send(true);
            tx
        });

        let result = b.broadcast(&request(), &mut rx).await;
        let _tx = signal.await.unwrap();

        assert_eq!(
            result.unwrap_err(),
            BroadcastInterrupted {
                attempt: 1,
                endpoint: "A".to_string(),
            }
        );
        // Abandoned, not rotated.
        assert_eq!(b.pool().current(), "A");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_retry_delay() {
        let (tx, mut rx) = watch::channel(false);
        let mut b = broadcaster(&["A", "B"], 3, ScriptedSubmitter::default());

        let signal = tokio::spawn(async move {
            sleep(Duration::from_millis(500)).await;
            let _ = tx.send(true);
            tx
        });

        let result = b.broadcast(&request(), &mut rx).await;
        let _tx = signal.await.unwrap();

        assert_eq!(
            result.unwrap_err(),
            BroadcastInterrupted {
                attempt: 2,
                endpoint: "B".to_string(),
            }
        );
        assert_eq!(b.submitter().calls(), vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_shut_down_makes_no_attempt() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        let mut b = broadcaster(&["A"], 3, ScriptedSubmitter::default());

        let result = b.broadcast(&request(), &mut rx).await;

        assert!(result.is_err());
        assert!(b.submitter().calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_shutdown_sender_does_not_cancel() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        let submitter = ScriptedSubmitter::with_script(vec![Ok(Confirmation::new("tx"))]);
        let mut b = broadcaster(&["A"], 1, submitter);

        let outcome = b.broadcast(&request(), &mut rx).await.unwrap();
        assert!(outcome.is_success());
    }

    /// Expected (attempts, success, final cursor) for a pool of `n` endpoints.
    fn model(n: usize, max_retries: u32, success_at: Option<u32>) -> (u32, bool, usize) {
        let mut attempt = 1;
        let mut index = 0;
        loop {
            if success_at == Some(attempt) {
                return (attempt, true, index);
            }
            if attempt == max_retries || n == 1 {
                return (attempt, false, index);
            }
            index = (index + 1) % n;
            attempt += 1;
        }
    }

    proptest! {
        #[test]
        fn retry_loop_matches_model(
            n in 1usize..5,
            max_retries in 1u32..6,
            success_at in proptest::option::of(1u32..7),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            let endpoints: Vec<String> = (0..n).map(|i| format!("node-{}", i)).collect();
            let script: Vec<_> = (1..=max_retries)
                .map(|a| {
                    if Some(a) == success_at {
                        Ok(Confirmation::new(format!("tx-{}", a)))
                    } else {
                        Err(refused("scripted"))
                    }
                })
                .collect();

            let (expected_attempts, expected_success, expected_index) =
                model(n, max_retries, success_at);

            let (outcome, calls, index) = runtime.block_on(async {
                let (_tx, mut rx) = watch::channel(false);
                let pool = EndpointPool::new(endpoints.clone()).unwrap();
                let mut b = TransactionBroadcaster::new(
                    pool,
                    policy(max_retries),
                    ScriptedSubmitter::with_script(script),
                );
                let outcome = b.broadcast(&request(), &mut rx).await.unwrap();
                (outcome, b.submitter().calls(), b.pool().index())
            });

            prop_assert_eq!(outcome.attempts(), expected_attempts);
            prop_assert_eq!(outcome.is_success(), expected_success);
            prop_assert_eq!(calls.len() as u32, expected_attempts);
            prop_assert_eq!(index, expected_index);
            prop_assert!(outcome.attempts() <= max_retries);
        }
    }
}
