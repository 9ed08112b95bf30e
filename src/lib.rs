//! # Task Processor Core
//!
//! A concurrent task orchestration engine: bounded-concurrency scheduling
//! over a dependency graph, retry with configurable backoff, circuit
//! breaking, and both batch and streaming result delivery.
//!
//! The typical entry point is [`ProcessorBuilder`], which produces a
//! [`TaskProcessor`] configured by one of its named presets or by explicit
//! setters, then submitted to via [`TaskProcessor::process_batch`],
//! [`TaskProcessor::process_definitions`], [`TaskProcessor::process_stream`],
//! or [`TaskProcessor::execute_one`].

pub mod builder;
pub mod circuit_breaker;
pub mod collection;
pub mod config;
pub mod dependency;
pub mod error;
pub mod health;
pub mod orchestrator;
pub mod pipeline;
pub mod pool;
pub mod processor;
pub mod progress;
pub mod retry;
pub mod scheduling;
pub mod stream;
pub mod task;
pub mod telemetry;

pub use crate::builder::ProcessorBuilder;
pub use crate::circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerOptions, CircuitBreakerStats};
pub use crate::config::{HealthCheckOptions, ProcessorConfig};
pub use crate::error::{ConfigurationError, ErrorCategory, ProcessorError, TaskError};
pub use crate::health::{check as health_check, HealthReport};
pub use crate::processor::TaskProcessor;
pub use crate::progress::TaskProgress;
pub use crate::retry::{BackoffStrategy, RetryPolicy};
pub use crate::scheduling::SchedulingStrategy;
pub use crate::task::{TaskDefinition, TaskFactory, TaskMetadata, TaskOutput, TaskResult};
pub use crate::telemetry::{TaskTelemetry, TelemetrySummary};

/// Result alias for processor entry points.
pub type ProcessorResult<T> = std::result::Result<T, ProcessorError>;

/// Crate version, as reported by Cargo.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn builder_produces_a_working_processor() {
        let processor = ProcessorBuilder::balanced().build().unwrap();
        let factory: TaskFactory = Arc::new(|_c| Box::pin(async { Ok(Arc::new(1i32) as TaskOutput) }));
        let results = processor.process_batch(vec![("only".to_string(), factory)], None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_successful);
    }
}
