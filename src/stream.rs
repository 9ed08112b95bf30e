//! Streaming producer: yields results in completion order over a bounded
//! channel, following the bounded `tokio::sync::mpsc` command-channel
//! pattern the task-mesh executor uses to report worker completions back
//! to its control loop.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::circuit_breaker::CircuitBreaker;
use crate::config::ProcessorConfig;
use crate::dependency::{resolve_order, DependencyIndex};
use crate::error::{ConfigurationError, ErrorCategory, ProcessorError};
use crate::pipeline;
use crate::scheduling::apply_strategy;
use crate::task::{TaskDefinition, TaskResult};

/// Bounded at `min(task_count, 100)` per the streaming capacity contract.
fn channel_capacity(task_count: usize) -> usize {
    task_count.min(100).max(1)
}

/// Runs every task exactly as `Orchestrator::run_batch` would (same
/// dependency validation, cascade-skip, and `continue_on_failure`
/// handling), admitting up to `max_concurrency` tasks at once so
/// independent tasks run concurrently, and yields each [`TaskResult`] to
/// the returned stream in completion order as soon as it terminates
/// rather than collecting them first.
pub async fn process_stream(
    mut definitions: Vec<TaskDefinition>,
    config: &ProcessorConfig,
    breaker: Option<Arc<CircuitBreaker>>,
    cancel: CancellationToken,
) -> Result<ReceiverStream<TaskResult>, ProcessorError> {
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
    apply_strategy(config.scheduling_strategy, &mut ordered_names, |n| &by_name[n]);

    let (tx, rx) = mpsc::channel(channel_capacity(ordered_names.len()));
    let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
    let max_in_flight = config.max_concurrency.max(1);
    let default_timeout = config.default_timeout;
    let default_retry = config.retry_policy.clone();
    let continue_on_failure = config.continue_on_failure;

    tokio::spawn(async move {
        let mut in_degree: HashMap<String, usize> = by_name.values().map(|d| (d.name.clone(), d.dependencies.len())).collect();
        let mut ready: VecDeque<String> = ordered_names.iter().filter(|n| in_degree[*n] == 0).cloned().collect();
        let mut failed_or_skipped: HashSet<String> = HashSet::new();
        let mut aborted = false;
        let mut in_flight: JoinSet<(String, TaskResult)> = JoinSet::new();

        'drive: loop {
            while in_flight.len() < max_in_flight {
                if tx.is_closed() || cancel.is_cancelled() {
                    break 'drive;
                }
                let Some(name) = ready.pop_front() else { break };
                let def = by_name[&name].clone();

                if aborted {
                    if tx.send(pipeline::skipped_result(&def, ErrorCategory::Aborted, "orchestrator aborted after an earlier failure")).await.is_err() {
                        break 'drive;
                    }
                    dependents.release(&name, &mut in_degree, &mut ready);
                    continue;
                }

                if def.dependencies.iter().any(|d| failed_or_skipped.contains(d)) {
                    failed_or_skipped.insert(name.clone());
                    if tx.send(pipeline::skipped_result(&def, ErrorCategory::DependencyFailed, "a dependency of this task did not succeed")).await.is_err() {
                        break 'drive;
                    }
                    dependents.release(&name, &mut in_degree, &mut ready);
                    continue;
                }

                let semaphore = semaphore.clone();
                let breaker = breaker.clone();
                let cancel_for_task = cancel.clone();
                let default_retry = default_retry.clone();
                let spawn_name = name.clone();
                in_flight.spawn(async move {
                    let result = std::panic::AssertUnwindSafe(pipeline::execute(&def, cancel_for_task, semaphore, breaker, default_timeout, &default_retry))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            TaskResult::failure(def.name.clone(), ErrorCategory::Unknown, "task worker panicked", false, 1, chrono::Utc::now(), std::time::Duration::ZERO, def.metadata.clone())
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
                        if !continue_on_failure {
                            aborted = true;
                        }
                    }
                    dependents.release(&name, &mut in_degree, &mut ready);
                    if tx.send(result).await.is_err() {
                        break;
                    }
                }
                Some(Err(_)) => {}
                None => break,
            }

            if cancel.is_cancelled() {
                break;
            }
        }
    });

    Ok(ReceiverStream::new(rx))
}
