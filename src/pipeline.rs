//! Per-task execution pipeline: admission, circuit gate, timeout-bounded
//! invocation (optionally retried), and classification.
//!
//! The cancellation/timeout interplay below is the same `tokio::select!`
//! race used by the task-mesh executor to run an external command under a
//! cancellable deadline, generalized from a child-process command to an
//! arbitrary user factory: a linked per-attempt scope is cancelled either
//! by the run's outer token or by `tokio::time::timeout` expiring, and the
//! two are distinguished so a timeout is never misreported as a
//! cancellation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::circuit_breaker::CircuitBreaker;
use crate::error::{classify, ErrorCategory};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::task::{TaskDefinition, TaskMetadata, TaskOutput, TaskResult};

/// Synthesizes a result for a task whose factory is never invoked: either
/// because a dependency failed or because `continue_on_failure = false`
/// aborted the remaining queue.
pub fn skipped_result(def: &TaskDefinition, category: ErrorCategory, message: impl Into<String>) -> TaskResult {
    let now = Utc::now();
    TaskResult::failure(def.name.clone(), category, message, false, 0, now, Duration::ZERO, def.metadata.clone())
}

#[instrument(skip(def, cancel, semaphore, breaker, default_retry), fields(task = %def.name))]
pub async fn execute(
    def: &TaskDefinition,
    cancel: CancellationToken,
    semaphore: Arc<Semaphore>,
    breaker: Option<Arc<CircuitBreaker>>,
    default_timeout: Duration,
    default_retry: &RetryPolicy,
) -> TaskResult {
    let start_time = Utc::now();
    let started = Instant::now();

    let _permit = tokio::select! {
        _ = cancel.cancelled() => {
            return cancelled_result(def, start_time, started.elapsed());
        }
        permit = semaphore.acquire() => match permit {
            Ok(p) => p,
            Err(_) => return cancelled_result(def, start_time, started.elapsed()),
        },
    };

    if let Some(breaker) = breaker.as_ref() {
        if !breaker.try_admit().await {
            return build_result(def, Err((anyhow::anyhow!("circuit open"), ErrorCategory::CircuitOpen)), 1, start_time, started.elapsed(), def.metadata.clone());
        }
    }

    let policy = def.retry_policy.clone().unwrap_or_else(|| default_retry.clone());
    let timeout_duration = def.timeout.unwrap_or(default_timeout);
    let outcome = retry_with_backoff(&policy, &cancel, |_attempt| invoke_once(def, &cancel, timeout_duration)).await;

    let category = outcome.result.as_ref().err().map(classify);
    if let Some(breaker) = breaker.as_ref() {
        match &outcome.result {
            Ok(_) => breaker.record_success().await,
            Err(_) if category != Some(ErrorCategory::Cancellation) => breaker.record_failure().await,
            Err(_) => {}
        }
    }

    let tagged = outcome.result.map_err(|e| (e, category.unwrap_or(ErrorCategory::Unknown)));
    build_result(def, tagged, outcome.attempt_number, start_time, started.elapsed(), def.metadata.clone())
}

/// Runs the factory once under a per-attempt cancellation scope linked to
/// the outer token, racing a timeout. Distinguishes `Timeout` from
/// `Cancellation` by which branch of the race fires.
async fn invoke_once(def: &TaskDefinition, cancel: &CancellationToken, timeout: Duration) -> (anyhow::Result<TaskOutput>, ErrorCategory) {
    let scope = cancel.child_token();
    let fut = (def.factory)(scope.clone());
    tokio::select! {
        _ = cancel.cancelled() => {
            scope.cancel();
            (Err(anyhow::anyhow!("task cancelled")), ErrorCategory::Cancellation)
        }
        res = tokio::time::timeout(timeout, fut) => match res {
            Ok(Ok(value)) => (Ok(value), ErrorCategory::Unknown),
            Ok(Err(e)) => {
                let cat = classify(&e);
                (Err(e), cat)
            }
            Err(_) => {
                scope.cancel();
                (Err(anyhow::anyhow!("task timed out after {timeout:?}")), ErrorCategory::Timeout)
            }
        },
    }
}

fn cancelled_result(def: &TaskDefinition, start_time: chrono::DateTime<Utc>, elapsed: Duration) -> TaskResult {
    TaskResult::failure(def.name.clone(), ErrorCategory::Cancellation, "task processing was cancelled", false, 0, start_time, elapsed, def.metadata.clone())
}

fn build_result(
    def: &TaskDefinition,
    outcome: Result<TaskOutput, (anyhow::Error, ErrorCategory)>,
    attempt_number: u32,
    start_time: chrono::DateTime<Utc>,
    elapsed: Duration,
    metadata: TaskMetadata,
) -> TaskResult {
    match outcome {
        Ok(data) => TaskResult::success(def.name.clone(), data, attempt_number, start_time, elapsed, metadata),
        Err((error, category)) => {
            TaskResult::failure(def.name.clone(), category, error.to_string(), category.is_retryable_by_default(), attempt_number, start_time, elapsed, metadata)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::TaskError;

    fn semaphore(n: usize) -> Arc<Semaphore> {
        Arc::new(Semaphore::new(n))
    }

    #[tokio::test]
    async fn successful_factory_yields_success_result() {
        let def = TaskDefinition::new("t1", Arc::new(|_c| Box::pin(async { Ok(Arc::new(7i32) as TaskOutput) })));
        let result = execute(&def, CancellationToken::new(), semaphore(1), None, Duration::from_secs(1), &RetryPolicy::default()).await;
        assert!(result.is_successful);
        assert_eq!(*result.downcast::<i32>().unwrap(), 7);
        assert_eq!(result.attempt_number, 1);
    }

    #[tokio::test]
    async fn timeout_is_classified_as_timeout_not_cancellation() {
        let def = TaskDefinition::new(
            "slow",
            Arc::new(|_c| Box::pin(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(Arc::new(()) as TaskOutput)
            })),
        )
        .with_timeout(Duration::from_millis(20));
        let result = execute(&def, CancellationToken::new(), semaphore(1), None, Duration::from_secs(5), &RetryPolicy::default()).await;
        assert!(!result.is_successful);
        assert_eq!(result.error_category, Some(ErrorCategory::Timeout));
    }

    #[tokio::test]
    async fn outer_cancellation_is_classified_as_cancellation() {
        let def = TaskDefinition::new(
            "never",
            Arc::new(|_c| Box::pin(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(Arc::new(()) as TaskOutput)
            })),
        );
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel_clone.cancel();
        });
        let result = execute(&def, cancel, semaphore(1), None, Duration::from_secs(5), &RetryPolicy::default()).await;
        assert!(!result.is_successful);
        assert_eq!(result.error_category, Some(ErrorCategory::Cancellation));
    }

    #[tokio::test]
    async fn tagged_task_error_is_classified_precisely() {
        let def = TaskDefinition::new(
            "bad-input",
            Arc::new(|_c| Box::pin(async { Err(TaskError::new(ErrorCategory::Validation, "nope").into()) })),
        );
        let result = execute(&def, CancellationToken::new(), semaphore(1), None, Duration::from_secs(1), &RetryPolicy::default()).await;
        assert_eq!(result.error_category, Some(ErrorCategory::Validation));
        assert!(!result.is_retryable);
    }

    #[tokio::test]
    async fn retry_policy_retries_network_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let def = TaskDefinition::new(
            "flaky",
            Arc::new(move |_c| {
                let attempts = attempts_clone.clone();
                Box::pin(async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(TaskError::new(ErrorCategory::Network, "blip").into())
                    } else {
                        Ok(Arc::new("ok".to_string()) as TaskOutput)
                    }
                })
            }),
        )
        .with_retry_policy(RetryPolicy::exponential(3, Duration::from_millis(1), Duration::from_millis(5)));
        let result = execute(&def, CancellationToken::new(), semaphore(1), None, Duration::from_secs(1), &RetryPolicy::default()).await;
        assert!(result.is_successful);
        assert_eq!(result.attempt_number, 3);
    }

    #[tokio::test]
    async fn is_retryable_reflects_terminal_category_even_after_retries_are_exhausted() {
        let def = TaskDefinition::new(
            "always-flaky",
            Arc::new(|_c| Box::pin(async { Err(TaskError::new(ErrorCategory::Network, "down").into()) })),
        )
        .with_retry_policy(RetryPolicy::exponential(2, Duration::from_millis(1), Duration::from_millis(5)));
        let result = execute(&def, CancellationToken::new(), semaphore(1), None, Duration::from_secs(1), &RetryPolicy::default()).await;
        assert!(!result.is_successful);
        assert_eq!(result.attempt_number, 2);
        assert!(result.is_retryable, "Network is retryable by category even though attempts are exhausted");
    }

    #[tokio::test]
    async fn open_circuit_breaker_rejects_without_invoking_factory() {
        let invoked = Arc::new(AtomicU32::new(0));
        let invoked_clone = invoked.clone();
        let def = TaskDefinition::new(
            "gated",
            Arc::new(move |_c| {
                invoked_clone.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(Arc::new(()) as TaskOutput) })
            }),
        );
        let breaker = Arc::new(CircuitBreaker::new(crate::circuit_breaker::CircuitBreakerOptions {
            failure_threshold: 1,
            time_window: Duration::from_secs(1),
            open_duration: Duration::from_secs(10),
        }));
        breaker.record_failure().await;
        let result = execute(&def, CancellationToken::new(), semaphore(1), Some(breaker), Duration::from_secs(1), &RetryPolicy::default()).await;
        assert_eq!(result.error_category, Some(ErrorCategory::CircuitOpen));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }
}
