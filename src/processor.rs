//! Processor facade: the single entry point owning every shared component
//! for the lifetime of a `TaskProcessor` instance.
//!
//! Narrows the original `OrchestratorCore`'s long-lived background-loop
//! lifecycle (`Initializing -> Running -> Shutting -> Stopped`) down to a
//! facade whose state (results, telemetry, breaker) accumulates across
//! bounded runs rather than a perpetually-running service — there is no
//! ambient execution queue or background task here, only the state C1-C10
//! share between calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{RwLock, Semaphore};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerStats};
use crate::collection::ResultCollection;
use crate::config::ProcessorConfig;
use crate::error::{ErrorCategory, ProcessorError};
use crate::health::{self, HealthReport};
use crate::orchestrator::{CompletionSink, Orchestrator, ProgressSink};
use crate::pipeline;
use crate::pool::ResultPool;
use crate::progress::TaskProgress;
use crate::stream;
use crate::task::{TaskDefinition, TaskFactory, TaskResult};
use crate::telemetry::{summarize, TaskTelemetry, TelemetryExporter, TelemetrySummary};

pub struct TaskProcessor {
    config: ProcessorConfig,
    results: ResultCollection<TaskResult>,
    telemetry: ResultCollection<TaskTelemetry>,
    breaker: Option<Arc<CircuitBreaker>>,
    pool: Option<Arc<ResultPool>>,
    progress_sink: Option<ProgressSink>,
    completion_sink: Option<CompletionSink>,
    exporter: Option<TelemetryExporter>,
    latest_progress: Arc<RwLock<TaskProgress>>,
    master_cancel: CancellationToken,
    initialized: AtomicBool,
    disposed: AtomicBool,
}

impl std::fmt::Debug for TaskProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskProcessor")
            .field("config", &self.config)
            .field("initialized", &self.initialized)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

impl TaskProcessor {
    pub(crate) fn new(config: ProcessorConfig, progress_sink: Option<ProgressSink>, completion_sink: Option<CompletionSink>) -> Self {
        let breaker = config.circuit_breaker.clone().map(|opts| Arc::new(CircuitBreaker::new(opts)));
        let pool = config.enable_memory_pooling.then(|| Arc::new(ResultPool::new(config.max_concurrency * 2)));
        Self {
            latest_progress: Arc::new(RwLock::new(TaskProgress {
                completed_tasks: 0,
                total_tasks: 0,
                current_task_name: None,
                elapsed: std::time::Duration::ZERO,
                estimated_time_remaining: None,
                success_rate: 0.0,
            })),
            config,
            results: ResultCollection::new(),
            telemetry: ResultCollection::new(),
            breaker,
            pool,
            progress_sink,
            completion_sink,
            exporter: None,
            master_cancel: CancellationToken::new(),
            initialized: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn set_telemetry_exporter(&mut self, exporter: TelemetryExporter) {
        self.exporter = Some(exporter);
    }

    /// Idempotent: a second call is a no-op.
    pub fn initialize(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    fn link_cancel(&self, outer: Option<CancellationToken>) -> CancellationToken {
        let child = self.master_cancel.child_token();
        match outer {
            Some(outer) => {
                let linked = child.clone();
                tokio::spawn(async move {
                    outer.cancelled().await;
                    linked.cancel();
                });
                child
            }
            None => child,
        }
    }

    fn composite_progress_sink(&self) -> ProgressSink {
        let latest = self.latest_progress.clone();
        let user = self.progress_sink.clone();
        Arc::new(move |progress: TaskProgress| {
            let latest = latest.clone();
            let user = user.clone();
            let progress_for_store = progress.clone();
            tokio::spawn(async move {
                *latest.write().await = progress_for_store;
            });
            if let Some(user) = user {
                user(progress);
            }
        })
    }

    async fn export_telemetry(&self) {
        if let Some(exporter) = &self.exporter {
            let snapshot = self.telemetry.snapshot().await;
            if let Err(e) = exporter(&snapshot) {
                warn!(error = %e, "telemetry export failed");
            }
        }
    }

    /// `processBatch`: a plain name/factory list, executed in submission
    /// order unless a scheduling strategy or dependency graph reorders it.
    pub async fn process_batch(&self, tasks: Vec<(String, TaskFactory)>, cancel: Option<CancellationToken>) -> Result<Vec<TaskResult>, ProcessorError> {
        let defs = tasks.into_iter().map(|(name, factory)| TaskDefinition::new(name, factory)).collect();
        self.process_definitions(defs, cancel).await
    }

    /// `processDefinitions`: full task definitions, with dependencies,
    /// priorities, and per-task overrides honored.
    pub async fn process_definitions(&self, defs: Vec<TaskDefinition>, cancel: Option<CancellationToken>) -> Result<Vec<TaskResult>, ProcessorError> {
        self.initialize();
        let cancel = self.link_cancel(cancel);
        let orchestrator =
            Orchestrator { config: &self.config, breaker: self.breaker.clone(), progress_sink: Some(self.composite_progress_sink()), completion_sink: self.completion_sink.clone() };
        let outcome = orchestrator.run_batch(defs, &self.results, &self.telemetry, cancel).await?;
        self.export_telemetry().await;
        Ok(outcome.results)
    }

    /// `processStream`: results are yielded as each task terminates rather
    /// than collected up front.
    pub async fn process_stream(&self, tasks: Vec<(String, TaskFactory)>, cancel: Option<CancellationToken>) -> Result<ReceiverStream<TaskResult>, ProcessorError> {
        self.initialize();
        let cancel = self.link_cancel(cancel);
        let defs = tasks.into_iter().map(|(name, factory)| TaskDefinition::new(name, factory)).collect();
        stream::process_stream(defs, &self.config, self.breaker.clone(), cancel).await
    }

    /// `executeOne`: a single task, run outside the dependency resolver and
    /// scheduler. Unlike the batch/streaming paths, a factory failure here
    /// is surfaced to the caller as `ProcessorError::TaskFailed` rather
    /// than merely recorded, since there is no downstream result whose
    /// reachability a raised error would threaten.
    pub async fn execute_one(&self, name: impl Into<String>, factory: TaskFactory, cancel: Option<CancellationToken>) -> Result<TaskResult, ProcessorError> {
        self.initialize();
        let cancel = self.link_cancel(cancel);
        let def = TaskDefinition::new(name, factory);
        let semaphore = Arc::new(Semaphore::new(1));
        let result = pipeline::execute(&def, cancel.clone(), semaphore, self.breaker.clone(), self.config.default_timeout, &self.config.retry_policy).await;
        if cancel.is_cancelled() && result.error_category == Some(ErrorCategory::Cancellation) {
            return Err(ProcessorError::Cancelled);
        }
        let record = TaskTelemetry {
            task_name: result.name.clone(),
            elapsed_ms: result.execution_time.as_millis() as u64,
            is_successful: result.is_successful,
            error_type_name: result.error_category.map(|c| c.to_string()),
            error_message: result.error_message.clone(),
            timestamp: result.timestamp,
        };
        self.telemetry.add(record).await;
        self.results.add(result.clone()).await;
        if result.is_successful {
            Ok(result)
        } else {
            Err(ProcessorError::TaskFailed(Box::new(result)))
        }
    }

    /// Typed convenience wrapper over [`execute_one`](Self::execute_one):
    /// checked-downcasts the successful payload, surfacing a mismatch as a
    /// `TypeMismatch`-categorized failure rather than panicking.
    pub async fn execute_one_typed<T: std::any::Any + Send + Sync>(
        &self,
        name: impl Into<String>,
        factory: TaskFactory,
        cancel: Option<CancellationToken>,
    ) -> Result<Arc<T>, ProcessorError> {
        let result = self.execute_one(name, factory, cancel).await?;
        result.downcast::<T>().ok_or_else(|| {
            let mut mismatched = result.clone();
            mismatched.is_successful = false;
            mismatched.error_category = Some(ErrorCategory::TypeMismatch);
            mismatched.error_message = Some("task output did not match the requested type".to_string());
            ProcessorError::TaskFailed(Box::new(mismatched))
        })
    }

    pub async fn results(&self) -> Vec<TaskResult> {
        self.results.snapshot().await
    }

    pub async fn telemetry(&self) -> Vec<TaskTelemetry> {
        self.telemetry.snapshot().await
    }

    pub async fn summary(&self) -> TelemetrySummary {
        summarize(&self.telemetry.snapshot().await)
    }

    pub async fn progress(&self) -> TaskProgress {
        self.latest_progress.read().await.clone()
    }

    pub async fn breaker_stats(&self) -> Option<CircuitBreakerStats> {
        match &self.breaker {
            Some(breaker) => Some(breaker.stats().await),
            None => None,
        }
    }

    pub async fn health_check(&self) -> HealthReport {
        let summary = self.summary().await;
        let stats = self.breaker_stats().await;
        health::check(&self.config.health_check, &summary, stats.as_ref())
    }

    /// Acquires a pooled scratch object, if pooling is enabled, for hosts
    /// that want to batch their own result construction through the same
    /// reuse pattern the pipeline uses internally.
    pub fn pool(&self) -> Option<&Arc<ResultPool>> {
        self.pool.as_ref()
    }

    /// Cancels the master cancellation source and marks the processor
    /// disposed. Idempotent; safe to call more than once.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.master_cancel.cancel();
        }
    }
}

impl Drop for TaskProcessor {
    fn drop(&mut self) {
        self.dispose();
    }
}
