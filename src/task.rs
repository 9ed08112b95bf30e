//! Task declaration and outcome types.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::ErrorCategory;
use crate::retry::RetryPolicy;

/// Opaque key/value bag attached to a definition and carried through to its
/// result.
pub type TaskMetadata = HashMap<String, serde_json::Value>;

/// The arbitrarily-typed payload a task factory produces on success.
///
/// Wrapped in `Arc` (rather than `Box`) so a [`crate::pool::PooledResult`]
/// can cheaply defensive-copy a result by cloning the handle without cloning
/// the underlying value.
pub type TaskOutput = Arc<dyn Any + Send + Sync>;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A unit of work. Constructed once, invoked at most once per run (unless
/// retried), parameterized by a cancellation scope that is cancelled either
/// when the outer run is cancelled or when the task's own timeout expires.
pub type TaskFactory = Arc<dyn Fn(CancellationToken) -> BoxFuture<anyhow::Result<TaskOutput>> + Send + Sync>;

/// Declarative description of a task submitted to the processor.
#[derive(Clone)]
pub struct TaskDefinition {
    pub name: String,
    pub factory: TaskFactory,
    pub dependencies: Vec<String>,
    pub priority: i64,
    pub estimated_duration: Option<Duration>,
    pub timeout: Option<Duration>,
    pub retry_policy: Option<RetryPolicy>,
    pub metadata: TaskMetadata,
}

impl TaskDefinition {
    /// Build a definition with no dependencies, default priority, and no
    /// per-task overrides — the common case for `processBatch`-style
    /// submissions built from a plain name/factory map.
    pub fn new(name: impl Into<String>, factory: TaskFactory) -> Self {
        Self {
            name: name.into(),
            factory,
            dependencies: Vec::new(),
            priority: 0,
            estimated_duration: None,
            timeout: None,
            retry_policy: None,
            metadata: TaskMetadata::new(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_estimated_duration(mut self, duration: Duration) -> Self {
        self.estimated_duration = Some(duration);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn with_metadata(mut self, metadata: TaskMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("priority", &self.priority)
            .field("estimated_duration", &self.estimated_duration)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Outcome of a single task's terminal attempt.
#[derive(Clone, Debug)]
pub struct TaskResult {
    pub name: String,
    pub data: Option<TaskOutput>,
    pub is_successful: bool,
    pub error_message: Option<String>,
    pub error_category: Option<ErrorCategory>,
    pub is_retryable: bool,
    pub attempt_number: u32,
    pub start_time: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    pub execution_time: Duration,
    pub metadata: TaskMetadata,
}

impl TaskResult {
    pub fn success(name: impl Into<String>, data: TaskOutput, attempt_number: u32, start_time: DateTime<Utc>, execution_time: Duration, metadata: TaskMetadata) -> Self {
        Self {
            name: name.into(),
            data: Some(data),
            is_successful: true,
            error_message: None,
            error_category: None,
            is_retryable: false,
            attempt_number,
            start_time,
            timestamp: Utc::now(),
            execution_time,
            metadata,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn failure(
        name: impl Into<String>,
        category: ErrorCategory,
        message: impl Into<String>,
        is_retryable: bool,
        attempt_number: u32,
        start_time: DateTime<Utc>,
        execution_time: Duration,
        metadata: TaskMetadata,
    ) -> Self {
        Self {
            name: name.into(),
            data: None,
            is_successful: false,
            error_message: Some(message.into()),
            error_category: Some(category),
            is_retryable,
            attempt_number,
            start_time,
            timestamp: Utc::now(),
            execution_time,
            metadata,
        }
    }

    /// `true` once `error_category` is `DependencyFailed` or `Aborted` —
    /// i.e. the task's factory was never invoked.
    pub fn was_skipped(&self) -> bool {
        matches!(self.error_category, Some(ErrorCategory::DependencyFailed) | Some(ErrorCategory::Aborted))
    }

    /// Checked downcast of [`TaskResult::data`] into a concrete type,
    /// following the typed-result convenience layer.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.data.clone().and_then(|d| d.downcast::<T>().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory_ok() -> TaskFactory {
        Arc::new(|_cancel| Box::pin(async { Ok(Arc::new(42i32) as TaskOutput) }))
    }

    #[test]
    fn builder_methods_compose() {
        let def = TaskDefinition::new("t1", factory_ok())
            .with_priority(5)
            .with_dependencies(vec!["t0".to_string()])
            .with_timeout(Duration::from_secs(1));
        assert_eq!(def.name, "t1");
        assert_eq!(def.priority, 5);
        assert_eq!(def.dependencies, vec!["t0".to_string()]);
        assert_eq!(def.timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn downcast_recovers_typed_payload() {
        let result = TaskResult::success("t1", Arc::new(99i32), 1, Utc::now(), Duration::from_millis(1), TaskMetadata::new());
        assert_eq!(*result.downcast::<i32>().unwrap(), 99);
        assert!(result.downcast::<String>().is_none());
    }
}
