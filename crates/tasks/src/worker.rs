//! Worker-side execution wrapper.
//!
//! Runs a task body under a retry policy while polling the broker for
//! abort requests. Cancellation is cooperative: the task future is only
//! ever dropped between polls, and an observed abort wins over both
//! success and failure handling from that point on.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;

use crate::broker::Broker;
use crate::codec::TransferableError;
use crate::models::TaskId;

/// Retry and cancellation policy for one task execution.
#[derive(Debug, Clone)]
pub struct ExecutionPolicy {
    /// Attempts before a retryable failure becomes terminal. Floored
    /// at one.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub retry_delay: Duration,
    /// Type-name suffixes that must never be retried.
    pub non_retryable: Vec<String>,
    /// How often the broker is polled for an abort request.
    pub abort_poll_interval: Duration,
    /// After an abort is observed, how long the task body may still
    /// run to completion before it is dropped.
    pub cancel_grace: Duration,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
            non_retryable: Vec::new(),
            abort_poll_interval: Duration::from_secs(1),
            cancel_grace: Duration::from_secs(2),
        }
    }
}

impl ExecutionPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Mark an error type as non-retryable by type-name suffix, e.g.
    /// `"InvalidInput"` matches `my_app::errors::InvalidInput`.
    pub fn with_non_retryable(mut self, type_name_suffix: impl Into<String>) -> Self {
        self.non_retryable.push(type_name_suffix.into());
        self
    }

    pub fn with_abort_poll_interval(mut self, interval: Duration) -> Self {
        self.abort_poll_interval = interval;
        self
    }

    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    fn is_non_retryable(&self, type_name: &str) -> bool {
        self.non_retryable
            .iter()
            .any(|suffix| type_name.ends_with(suffix.as_str()))
    }
}

/// Terminal outcome of a wrapped execution.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success(Value),
    /// Encoded last error after retries were exhausted or refused.
    Failure(TransferableError),
    /// An abort request won; never reported as a failure.
    Aborted,
}

/// Run a task body under a policy, honoring abort requests.
///
/// The factory is invoked once per attempt. Abort detection is bounded
/// by the poll interval; once observed, the current attempt gets the
/// grace period to finish on its own, then is dropped. An aborted
/// execution is never retried, even mid-retry-delay.
pub async fn execute<F, Fut, E>(
    policy: &ExecutionPolicy,
    broker: &dyn Broker,
    task_id: &TaskId,
    mut factory: F,
) -> TaskOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Value, E>>,
    E: std::error::Error,
{
    let max_attempts: u32 = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let work = factory();
        tokio::pin!(work);

        let attempt_result: Result<Value, E> = loop {
            tokio::select! {
                result = &mut work => break result,
                _ = tokio::time::sleep(policy.abort_poll_interval) => {
                    match broker.abort_requested(task_id.uuid()).await {
                        Ok(true) => {
                            // Grace window: the body may still finish.
                            match tokio::time::timeout(policy.cancel_grace, &mut work).await {
                                Ok(Ok(value)) => return TaskOutcome::Success(value),
                                Ok(Err(_)) | Err(_) => return TaskOutcome::Aborted,
                            }
                        }
                        Ok(false) => {}
                        Err(err) => {
                            tracing::warn!(
                                task_id = %task_id,
                                error = %err,
                                "abort poll failed; continuing"
                            );
                        }
                    }
                }
            }
        };

        match attempt_result {
            Ok(value) => return TaskOutcome::Success(value),
            Err(err) => {
                let carrier: TransferableError = TransferableError::from_error(&err);
                if policy.is_non_retryable(&carrier.type_name) {
                    tracing::debug!(
                        task_id = %task_id,
                        type_name = %carrier.type_name,
                        "non-retryable failure"
                    );
                    return TaskOutcome::Failure(carrier);
                }
                if attempt >= max_attempts {
                    return TaskOutcome::Failure(carrier);
                }
                tracing::warn!(
                    task_id = %task_id,
                    attempt,
                    error = %carrier.message,
                    "task attempt failed, retrying"
                );
                tokio::time::sleep(policy.retry_delay).await;
            }
        }
    }
}
