//! Batch orchestrator: bounded fan-out over a dependency- and
//! strategy-ordered task list, with cascade-skip and cancellation
//! propagation.
//!
//! The run/cancel lifecycle mirrors the status-transition shape of the
//! original orchestrator core (`Running` -> `Completed`/`Failed`), narrowed
//! from a long-lived background-loop service down to a single bounded
//! batch run per call.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::collection::ResultCollection;
use crate::config::ProcessorConfig;
use crate::dependency::{resolve_order, DependencyIndex};
use crate::error::{ConfigurationError, ErrorCategory, ProcessorError};
use crate::pipeline;
use crate::progress::{ProgressTracker, TaskProgress};
use crate::scheduling::apply_strategy;
use crate::task::{TaskDefinition, TaskResult};
use crate::telemetry::TaskTelemetry;

/// Callback invoked after every task terminates, and once more at the
/// start of a run with `(0, total)`. Must not block — it is spawned off
/// the critical path, never awaited inline.
pub type ProgressSink = Arc<dyn Fn(TaskProgress) + Send + Sync>;
pub type CompletionSink = Arc<dyn Fn(&TaskResult) + Send + Sync>;

#[derive(Debug)]
pub struct RunOutcome {
    pub results: Vec<TaskResult>,
    pub telemetry: Vec<TaskTelemetry>,
}

pub struct Orchestrator<'a> {
    pub config: &'a ProcessorConfig,
    pub breaker: Option<Arc<CircuitBreaker>>,
    pub progress_sink: Option<ProgressSink>,
    pub completion_sink: Option<CompletionSink>,
}

impl<'a> Orchestrator<'a> {
    /// Validates dependencies, orders the batch, and runs tasks to
    /// completion under the configured concurrency cap, admitting up to
    /// `max_concurrency` tasks at once rather than one at a time: every
    /// task whose dependencies are already satisfied is dispatched as soon
    /// as a slot is free, so independent tasks run concurrently and
    /// results may complete out of submission order. Cascade-skips
    /// dependents of a failed dependency. Never returns a
    /// `ProcessorError::Cancelled` purely because `continue_on_failure` was
    /// tripped — see the module-level cascade rule below.
    pub async fn run_batch(
        &self,
        mut definitions: Vec<TaskDefinition>,
        results: &ResultCollection<TaskResult>,
        telemetry: &ResultCollection<TaskTelemetry>,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, ProcessorError> {
        let mut seen = HashSet::new();
        for def in &definitions {
            if !seen.insert(def.name.clone()) {
                return Err(ConfigurationError::DuplicateTaskName(def.name.clone()).into());
            }
        }

        let order = resolve_order(&definitions)?;
        let dependents = DependencyIndex::build(&definitions);
        let by_name: HashMap<String, TaskDefinition> = definitions.drain(..).map(|d| (d.name.clone(), d)).collect();

        let mut ordered_names = order;
        apply_strategy(self.config.scheduling_strategy, &mut ordered_names, |n| &by_name[n]);

        let total = ordered_names.len();
        let tracker = ProgressTracker::new(total);
        self.emit_progress(tracker.snapshot().await);

        if total == 0 {
            return Ok(RunOutcome { results: Vec::new(), telemetry: Vec::new() });
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let max_in_flight = self.config.max_concurrency.max(1);
        let mut in_degree: HashMap<String, usize> = by_name.values().map(|d| (d.name.clone(), d.dependencies.len())).collect();
        let mut ready: VecDeque<String> = ordered_names.iter().filter(|n| in_degree[*n] == 0).cloned().collect();
        let mut failed_or_skipped: HashSet<String> = HashSet::new();
        let mut aborted = false;
        let mut in_flight: JoinSet<(String, TaskResult)> = JoinSet::new();

        loop {
            while in_flight.len() < max_in_flight {
                let Some(name) = ready.pop_front() else { break };
                let def = by_name[&name].clone();

                if aborted {
                    let result = pipeline::skipped_result(&def, ErrorCategory::Aborted, "orchestrator aborted after an earlier failure");
                    self.record(results, telemetry, &tracker, result).await;
                    dependents.release(&name, &mut in_degree, &mut ready);
                    continue;
                }

                if def.dependencies.iter().any(|d| failed_or_skipped.contains(d)) {
                    let result = pipeline::skipped_result(&def, ErrorCategory::DependencyFailed, "a dependency of this task did not succeed");
                    failed_or_skipped.insert(name.clone());
                    self.record(results, telemetry, &tracker, result).await;
                    dependents.release(&name, &mut in_degree, &mut ready);
                    continue;
                }

                let semaphore = semaphore.clone();
                let breaker = self.breaker.clone();
                let cancel_for_task = cancel.clone();
                let default_timeout = self.config.default_timeout;
                let default_retry = self.config.retry_policy.clone();
                let spawn_name = name.clone();
                in_flight.spawn(async move {
                    let result = std::panic::AssertUnwindSafe(pipeline::execute(&def, cancel_for_task, semaphore, breaker, default_timeout, &default_retry))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            TaskResult::failure(def.name.clone(), ErrorCategory::Unknown, "task worker panicked", false, 1, chrono::Utc::now(), Duration::ZERO, def.metadata.clone())
                        });
                    (spawn_name, result)
                });
            }

            if in_flight.is_empty() {
                break;
            }

            match in_flight.join_next().await {
                Some(Ok((name, result))) => {
                    if !result.is_successful {
                        failed_or_skipped.insert(name.clone());
                        for dependent in dependents.dependents_of(&name) {
                            failed_or_skipped.insert(dependent.clone());
                        }
                        if !self.config.continue_on_failure {
                            aborted = true;
                        }
                    }
                    self.record(results, telemetry, &tracker, result).await;
                    dependents.release(&name, &mut in_degree, &mut ready);
                }
                Some(Err(join_err)) => {
                    warn!(error = %join_err, "task worker join failed unexpectedly");
                }
                None => break,
            }

            if cancel.is_cancelled() {
                break;
            }
        }

        if cancel.is_cancelled() {
            tokio::time::sleep(Duration::from_millis(25)).await;
            return Err(ProcessorError::Cancelled);
        }

        info!(total, "batch run complete");
        Ok(RunOutcome { results: results.snapshot().await, telemetry: telemetry.snapshot().await })
    }

    async fn record(&self, results: &ResultCollection<TaskResult>, telemetry: &ResultCollection<TaskTelemetry>, tracker: &ProgressTracker, result: TaskResult) {
        let record = TaskTelemetry {
            task_name: result.name.clone(),
            elapsed_ms: result.execution_time.as_millis() as u64,
            is_successful: result.is_successful,
            error_type_name: result.error_category.map(|c| c.to_string()),
            error_message: result.error_message.clone(),
            timestamp: result.timestamp,
        };
        telemetry.add(record).await;
        let progress = tracker.record_completion(&result.name, result.is_successful).await;
        if let Some(sink) = &self.completion_sink {
            let sink = sink.clone();
            let result_for_sink = result.clone();
            tokio::spawn(async move {
                let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sink(&result_for_sink)));
            });
        }
        results.add(result).await;
        self.emit_progress(progress);
    }

    fn emit_progress(&self, progress: TaskProgress) {
        if !self.config.enable_progress_reporting {
            return;
        }
        if let Some(sink) = &self.progress_sink {
            let sink = sink.clone();
            tokio::spawn(async move {
                let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sink(progress)));
            });
        }
    }
}
