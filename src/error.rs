//! Error taxonomy for the task processor.
//!
//! Failures inside a task factory are never allowed to unwind past the
//! pipeline: they are captured as an [`anyhow::Error`], classified into an
//! [`ErrorCategory`], and recorded on the [`crate::task::TaskResult`]. Only
//! two error kinds ever reach a processor caller directly: cancellation and
//! configuration problems, both raised before (or instead of) running any
//! task.

use std::fmt;

use thiserror::Error;

/// Top-level error a processor entry point can return to its caller.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("task processing was cancelled")]
    Cancelled,

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Surfaced only by `execute_one`: unlike the batch and streaming
    /// entry points, a single submitted task has no downstream consumers
    /// whose results would otherwise become unreachable, so its failure
    /// is raised directly rather than merely recorded.
    #[error("task {0:?} failed")]
    TaskFailed(Box<crate::task::TaskResult>),
}

/// Raised before any task runs whenever the submitted task set itself is
/// invalid.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("duplicate task name: {0}")]
    DuplicateTaskName(String),

    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: String },

    #[error("circular dependency detected among tasks: {0:?}")]
    CircularDependency(Vec<String>),

    #[error("invalid configuration: {0:?}")]
    Invalid(Vec<String>),
}

/// Classification of a terminal task failure.
///
/// `None` is not a variant here; its absence is represented by
/// `TaskResult::is_successful == true` with no category at all. Every other
/// member of the minimum taxonomy from the component design is present,
/// plus two local extensions (`TypeMismatch`, `Aborted`) used only by this
/// implementation's typed-result layer and `continueOnFailure` handling
/// respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorCategory {
    Timeout,
    Cancellation,
    Network,
    Server5xx,
    Client4xx,
    Authorization,
    Validation,
    NotFound,
    CircuitOpen,
    DependencyFailed,
    TypeMismatch,
    Aborted,
    Unknown,
}

impl ErrorCategory {
    /// Whether a failure of this category may be retried, absent an
    /// explicit per-policy override.
    pub fn is_retryable_by_default(self) -> bool {
        matches!(
            self,
            ErrorCategory::Timeout | ErrorCategory::Network | ErrorCategory::Server5xx | ErrorCategory::Unknown
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Timeout => "Timeout",
            ErrorCategory::Cancellation => "Cancellation",
            ErrorCategory::Network => "Network",
            ErrorCategory::Server5xx => "Server5xx",
            ErrorCategory::Client4xx => "Client4xx",
            ErrorCategory::Authorization => "Authorization",
            ErrorCategory::Validation => "Validation",
            ErrorCategory::NotFound => "NotFound",
            ErrorCategory::CircuitOpen => "CircuitOpen",
            ErrorCategory::DependencyFailed => "DependencyFailed",
            ErrorCategory::TypeMismatch => "TypeMismatch",
            ErrorCategory::Aborted => "Aborted",
            ErrorCategory::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// A task error tagged with an [`ErrorCategory`].
///
/// Factories are free to return any [`anyhow::Error`]; wrapping it in a
/// `TaskError` lets the pipeline classify it precisely instead of falling
/// back to [`ErrorCategory::Unknown`]. This mirrors the checked-downcast
/// convenience layer used for typed results: the pipeline attempts
/// `error.downcast_ref::<TaskError>()` and only falls back to `Unknown`
/// when the factory didn't tag its failure.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TaskError {
    pub category: ErrorCategory,
    pub message: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl TaskError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self { category, message: message.into(), source: None }
    }

    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }
}

/// Classifies an opaque factory failure into an [`ErrorCategory`].
///
/// Falls back to `Unknown` when the error was not produced via
/// [`TaskError`].
pub fn classify(error: &anyhow::Error) -> ErrorCategory {
    error.downcast_ref::<TaskError>().map(|e| e.category).unwrap_or(ErrorCategory::Unknown)
}
