//! Fluent builder for [`crate::processor::TaskProcessor`], with named
//! presets covering the common configuration shapes.

use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerOptions;
use crate::config::{HealthCheckOptions, ProcessorConfig};
use crate::error::ConfigurationError;
use crate::orchestrator::{CompletionSink, ProgressSink};
use crate::processor::TaskProcessor;
use crate::retry::RetryPolicy;
use crate::scheduling::SchedulingStrategy;

pub struct ProcessorBuilder {
    config: ProcessorConfig,
    progress_sink: Option<ProgressSink>,
    completion_sink: Option<CompletionSink>,
}

impl Default for ProcessorBuilder {
    fn default() -> Self {
        Self { config: ProcessorConfig::default(), progress_sink: None, completion_sink: None }
    }
}

impl ProcessorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_concurrency(mut self, value: usize) -> Self {
        self.config.max_concurrency = value;
        self
    }

    pub fn default_timeout(mut self, value: Duration) -> Self {
        self.config.default_timeout = value;
        self
    }

    pub fn continue_on_failure(mut self, value: bool) -> Self {
        self.config.continue_on_failure = value;
        self
    }

    pub fn scheduling_strategy(mut self, value: SchedulingStrategy) -> Self {
        self.config.scheduling_strategy = value;
        self
    }

    pub fn retry_policy(mut self, value: RetryPolicy) -> Self {
        self.config.retry_policy = value;
        self
    }

    pub fn circuit_breaker(mut self, value: CircuitBreakerOptions) -> Self {
        self.config.circuit_breaker = Some(value);
        self
    }

    pub fn enable_memory_pooling(mut self, value: bool) -> Self {
        self.config.enable_memory_pooling = value;
        self
    }

    pub fn enable_detailed_telemetry(mut self, value: bool) -> Self {
        self.config.enable_detailed_telemetry = value;
        self
    }

    pub fn health_check(mut self, value: HealthCheckOptions) -> Self {
        self.config.health_check = value;
        self
    }

    pub fn on_progress(mut self, sink: ProgressSink) -> Self {
        self.progress_sink = Some(sink);
        self
    }

    pub fn on_task_completed(mut self, sink: CompletionSink) -> Self {
        self.completion_sink = Some(sink);
        self
    }

    /// Favors raw throughput: high concurrency, a simple fixed retry,
    /// pooling on, telemetry off.
    pub fn high_throughput() -> Self {
        Self::default()
            .max_concurrency(num_cpus::get() * 4)
            .retry_policy(RetryPolicy { max_attempts: 2, ..RetryPolicy::default() })
            .enable_memory_pooling(true)
            .enable_detailed_telemetry(false)
    }

    /// Favors surviving flaky dependencies: network-oriented retry plus a
    /// circuit breaker, continuing past individual failures.
    pub fn resilient() -> Self {
        Self::default()
            .retry_policy(RetryPolicy::exponential_with_jitter(5, Duration::from_millis(200), Duration::from_secs(10), 0.2))
            .circuit_breaker(CircuitBreakerOptions { failure_threshold: 5, time_window: Duration::from_secs(30), open_duration: Duration::from_secs(15) })
            .continue_on_failure(true)
    }

    /// Short timeout, no retry: fail fast rather than wait.
    pub fn low_latency() -> Self {
        Self::default().default_timeout(Duration::from_millis(500)).retry_policy(RetryPolicy { max_attempts: 1, ..RetryPolicy::default() })
    }

    /// The library defaults, named for symmetry with the other presets.
    pub fn balanced() -> Self {
        Self::default()
    }

    /// Low concurrency, detailed telemetry — easier to single-step through
    /// while developing against the processor.
    pub fn development() -> Self {
        Self::default().max_concurrency(2).enable_detailed_telemetry(true)
    }

    pub fn build(self) -> Result<TaskProcessor, ConfigurationError> {
        self.config.validate()?;
        Ok(TaskProcessor::new(self.config, self.progress_sink, self.completion_sink))
    }
}
