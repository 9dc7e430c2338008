//! Single-stage execution with bounded retries.

use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use super::backoff_delay;
use crate::cancellation::CancellationToken;
use crate::config::RunPolicy;
use crate::core::{ArtifactKey, StageResult};
use crate::errors::StageError;
use crate::events::EventSink;
use crate::utils::elapsed_ms;

/// Runs stage functions under the run policy.
///
/// Each attempt is bounded by the per-stage timeout; a timed-out attempt
/// counts as a transient failure. Transient failures are retried up to
/// `max_retries` times with capped exponential backoff, so a stage function
/// is called at most `max_retries + 1` times. Permanent and validation
/// failures end the stage after a single call.
///
/// Stage errors never escape: the outcome is always a [`StageResult`].
#[derive(Clone)]
pub struct StageExecutor {
    policy: RunPolicy,
    sink: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
}

impl StageExecutor {
    /// Creates an executor bound to one run.
    #[must_use]
    pub fn new(policy: RunPolicy, sink: Arc<dyn EventSink>, cancel: Arc<CancellationToken>) -> Self {
        Self {
            policy,
            sink,
            cancel,
        }
    }

    /// The same executor with retries disabled.
    #[must_use]
    pub fn single_attempt(&self) -> Self {
        Self {
            policy: self.policy.clone().with_max_retries(0),
            ..self.clone()
        }
    }

    /// The run policy.
    #[must_use]
    pub fn policy(&self) -> &RunPolicy {
        &self.policy
    }

    /// The run-wide cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// The event sink attempts are reported to.
    #[must_use]
    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// Executes `stage` against `input` for the artifact `key`.
    ///
    /// The key is assigned by the caller before invocation and is only used
    /// for logging here. No attempt starts once the run is cancelled; an
    /// attempt already in flight finishes (or times out) normally.
    pub async fn execute<'a, I, T, F, Fut>(
        &self,
        key: &ArtifactKey,
        input: &'a I,
        stage: F,
    ) -> StageResult<T>
    where
        I: ?Sized,
        F: Fn(&'a I) -> Fut,
        Fut: Future<Output = Result<T, StageError>>,
    {
        let mut attempts: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                let reason = self.cancel.reason().unwrap_or_default();
                return StageResult::Failed {
                    error: StageError::cancelled(reason),
                    attempts,
                };
            }

            attempts += 1;
            let started = Instant::now();
            let outcome = match tokio::time::timeout(self.policy.stage_timeout(), stage(input)).await
            {
                Ok(result) => result,
                Err(_) => Err(StageError::timeout(self.policy.stage_timeout_ms)),
            };
            let elapsed = elapsed_ms(started);

            let error = match outcome {
                Ok(output) => {
                    tracing::debug!(
                        key = %key,
                        slot = %key.slot,
                        stage = %key.stage,
                        attempt = attempts,
                        elapsed_ms = elapsed,
                        "Stage attempt succeeded"
                    );
                    self.sink.try_emit(
                        "stage.attempt",
                        Some(json!({
                            "key": key.to_string(),
                            "slot": key.slot,
                            "stage": key.stage,
                            "attempt": attempts,
                            "elapsed_ms": elapsed,
                            "ok": true,
                        })),
                    );
                    return StageResult::Success {
                        output,
                        attempts,
                    };
                }
                Err(error) => error,
            };

            self.sink.try_emit(
                "stage.attempt",
                Some(json!({
                    "key": key.to_string(),
                    "slot": key.slot,
                    "stage": key.stage,
                    "attempt": attempts,
                    "elapsed_ms": elapsed,
                    "ok": false,
                    "error_class": error.class,
                    "error": error.message,
                })),
            );

            if error.is_retryable() && attempts <= self.policy.max_retries {
                let delay = backoff_delay(&self.policy, attempts - 1);
                tracing::warn!(
                    key = %key,
                    slot = %key.slot,
                    stage = %key.stage,
                    attempt = attempts,
                    elapsed_ms = elapsed,
                    error_class = %error.class,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error.message,
                    "Retrying stage after transient error"
                );
                self.sink.try_emit(
                    "stage.retry",
                    Some(json!({
                        "key": key.to_string(),
                        "attempt": attempts,
                        "delay_ms": u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "error_class": error.class,
                    })),
                );

                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = self.cancel.cancelled() => {}
                }
                continue;
            }

            let error = if error.is_retryable() {
                error.exhausted()
            } else {
                error
            };
            tracing::warn!(
                key = %key,
                slot = %key.slot,
                stage = %key.stage,
                attempt = attempts,
                elapsed_ms = elapsed,
                error_class = %error.class,
                error = %error.message,
                "Stage failed"
            );
            self.sink.try_emit(
                "stage.failed",
                Some(json!({
                    "key": key.to_string(),
                    "attempts": attempts,
                    "error": error.to_dict(),
                })),
            );
            return StageResult::Failed { error, attempts };
        }
    }
}

impl std::fmt::Debug for StageExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageExecutor")
            .field("policy", &self.policy)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Slot, StageName};
    use crate::errors::ErrorClass;
    use crate::events::{CollectingEventSink, NoOpEventSink};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn key() -> ArtifactKey {
        ArtifactKey::new(StageName::Search, Slot::Topic(1))
    }

    fn executor(policy: RunPolicy) -> StageExecutor {
        StageExecutor::new(
            policy,
            Arc::new(NoOpEventSink),
            Arc::new(CancellationToken::new()),
        )
    }

    fn fast_policy(retries: u32) -> RunPolicy {
        RunPolicy::new()
            .with_max_retries(retries)
            .with_base_delay_ms(10)
            .with_max_delay_ms(40)
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_retried_until_bound() {
        let calls = AtomicU32::new(0);
        let exec = executor(fast_policy(3));

        let result: StageResult<()> = exec
            .execute(&key(), &calls, |calls| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StageError::transient("503"))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(result.attempts(), 4);
        match result {
            StageResult::Failed { error, .. } => assert_eq!(error.class, ErrorClass::Transient),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_permanent_and_validation_called_once() {
        for error in [StageError::permanent("401"), StageError::validation("empty")] {
            let calls = AtomicU32::new(0);
            let exec = executor(fast_policy(5));
            let expected = error.class;

            let result: StageResult<()> = exec
                .execute(&key(), &calls, |calls| {
                    let error = error.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(error)
                    }
                })
                .await;

            assert_eq!(calls.load(Ordering::SeqCst), 1);
            match result {
                StageResult::Failed { error, attempts } => {
                    assert_eq!(attempts, 1);
                    assert_eq!(error.class, expected);
                }
                other => panic!("expected failure, got {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient() {
        let calls = AtomicU32::new(0);
        let exec = executor(fast_policy(2));

        let result = exec
            .execute(&key(), &calls, |calls| async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(StageError::transient("reset"))
                } else {
                    Ok("snippets")
                }
            })
            .await;

        assert_eq!(
            result,
            StageResult::Success {
                output: "snippets",
                attempts: 2
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_result_becomes_validation_on_exhaustion() {
        let exec = executor(fast_policy(1));

        let result: StageResult<()> = exec
            .execute(&key(), &(), |_| async {
                Err(StageError::empty_result("no search results"))
            })
            .await;

        match result {
            StageResult::Failed { error, attempts } => {
                assert_eq!(attempts, 2);
                assert_eq!(error.class, ErrorClass::Validation);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transient() {
        let calls = AtomicU32::new(0);
        let exec = executor(fast_policy(1).with_stage_timeout_ms(100));

        let result: StageResult<()> = exec
            .execute(&key(), &calls, |calls| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match result {
            StageResult::Failed { error, .. } => {
                assert_eq!(error.class, ErrorClass::Transient);
                assert!(error.message.contains("timed out"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_after_cancellation() {
        let calls = AtomicU32::new(0);
        let cancel = Arc::new(CancellationToken::new());
        let exec = StageExecutor::new(fast_policy(5), Arc::new(NoOpEventSink), cancel.clone());

        let result: StageResult<()> = exec
            .execute(&key(), &calls, |calls| {
                let cancel = cancel.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    cancel.cancel("budget exceeded");
                    Err(StageError::transient("flaky"))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match result {
            StageResult::Failed { error, attempts } => {
                assert_eq!(attempts, 1);
                assert!(error.cancelled);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_events_are_emitted() {
        let sink = Arc::new(CollectingEventSink::new());
        let exec = StageExecutor::new(
            fast_policy(1),
            sink.clone(),
            Arc::new(CancellationToken::new()),
        );

        let _: StageResult<()> = exec
            .execute(&key(), &(), |_| async { Err(StageError::transient("x")) })
            .await;

        assert_eq!(sink.events_of_type("stage.attempt").len(), 2);
        assert_eq!(sink.events_of_type("stage.retry").len(), 1);
        let failed = sink.events_of_type("stage.failed");
        assert_eq!(failed.len(), 1);
        let data = failed[0].1.as_ref().unwrap();
        assert_eq!(data["key"], "search:topic_01:0");
        assert_eq!(data["attempts"], 2);
    }
}
