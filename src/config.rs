//! Processor configuration, validation, and file/env loading.
//!
//! Trimmed down from the original `OrchestratorConfig` (which also carried
//! persistence, security, cluster, quantum, and consciousness sub-configs)
//! to the knobs this processor actually has a use for, following the same
//! `config`-crate-backed `from_file`/`validate` shape.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitBreakerOptions;
use crate::error::ConfigurationError;
use crate::retry::RetryPolicy;
use crate::scheduling::SchedulingStrategy;

#[derive(Debug, Clone)]
pub struct HealthCheckOptions {
    pub min_success_rate: f64,
    pub max_avg_execution_time: Duration,
}

impl Default for HealthCheckOptions {
    fn default() -> Self {
        Self { min_success_rate: 50.0, max_avg_execution_time: Duration::from_secs(30) }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub max_concurrency: usize,
    pub default_timeout: Duration,
    pub continue_on_failure: bool,
    pub enable_detailed_telemetry: bool,
    pub enable_progress_reporting: bool,
    pub enable_memory_pooling: bool,
    pub scheduling_strategy: SchedulingStrategy,
    pub retry_policy: RetryPolicy,
    pub circuit_breaker: Option<CircuitBreakerOptions>,
    pub enable_dependency_resolution: bool,
    pub health_check: HealthCheckOptions,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: (num_cpus::get() * 2).max(1),
            default_timeout: Duration::from_secs(30),
            continue_on_failure: true,
            enable_detailed_telemetry: true,
            enable_progress_reporting: true,
            enable_memory_pooling: false,
            scheduling_strategy: SchedulingStrategy::Fifo,
            retry_policy: RetryPolicy::default(),
            circuit_breaker: None,
            enable_dependency_resolution: true,
            health_check: HealthCheckOptions::default(),
        }
    }
}

impl ProcessorConfig {
    /// Collects every violation rather than failing on the first, so a
    /// caller can fix a misconfiguration in one pass.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut problems = Vec::new();
        if self.max_concurrency == 0 {
            problems.push("max_concurrency must be greater than zero".to_string());
        }
        if self.default_timeout <= Duration::ZERO {
            problems.push("default_timeout must be positive".to_string());
        }
        if self.retry_policy.max_attempts == 0 {
            problems.push("retry_policy.max_attempts must be at least 1".to_string());
        }
        if self.retry_policy.base_delay <= Duration::ZERO {
            problems.push("retry_policy.base_delay must be positive".to_string());
        }
        if self.retry_policy.max_delay < self.retry_policy.base_delay {
            problems.push("retry_policy.max_delay must be >= base_delay".to_string());
        }
        if let Some(breaker) = &self.circuit_breaker {
            if breaker.failure_threshold == 0 {
                problems.push("circuit_breaker.failure_threshold must be greater than zero".to_string());
            }
        }
        if self.health_check.min_success_rate < 0.0 || self.health_check.min_success_rate > 100.0 {
            problems.push("health_check.min_success_rate must be within 0..=100".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError::Invalid(problems))
        }
    }

    /// Loads overrides from a TOML file merged over the library defaults,
    /// then environment variables prefixed `TASK_PROCESSOR_`, mirroring the
    /// source's `OrchestratorConfig::from_file`.
    pub fn from_file(path: &str) -> anyhow::Result<FileOverrides> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("TASK_PROCESSOR"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

/// Subset of [`ProcessorConfig`] that is meaningfully expressible as plain
/// data for file/env loading; durations are expressed in milliseconds
/// since `config`/`serde` do not natively understand `std::time::Duration`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileOverrides {
    pub max_concurrency: Option<usize>,
    pub default_timeout_ms: Option<u64>,
    pub continue_on_failure: Option<bool>,
    pub enable_detailed_telemetry: Option<bool>,
    pub enable_progress_reporting: Option<bool>,
    pub enable_memory_pooling: Option<bool>,
}

impl FileOverrides {
    pub fn apply(&self, base: &mut ProcessorConfig) {
        if let Some(v) = self.max_concurrency {
            base.max_concurrency = v;
        }
        if let Some(v) = self.default_timeout_ms {
            base.default_timeout = Duration::from_millis(v);
        }
        if let Some(v) = self.continue_on_failure {
            base.continue_on_failure = v;
        }
        if let Some(v) = self.enable_detailed_telemetry {
            base.enable_detailed_telemetry = v;
        }
        if let Some(v) = self.enable_progress_reporting {
            base.enable_progress_reporting = v;
        }
        if let Some(v) = self.enable_memory_pooling {
            base.enable_memory_pooling = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ProcessorConfig::default().validate().is_ok());
    }

    #[test]
    fn validation_collates_every_violation() {
        let config = ProcessorConfig {
            max_concurrency: 0,
            default_timeout: Duration::ZERO,
            retry_policy: RetryPolicy { max_attempts: 0, base_delay: Duration::ZERO, max_delay: Duration::ZERO, ..RetryPolicy::default() },
            ..ProcessorConfig::default()
        };
        let err = config.validate().unwrap_err();
        match err {
            ConfigurationError::Invalid(problems) => assert!(problems.len() >= 4),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn file_overrides_round_trip_through_a_temp_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "max_concurrency = 4\ncontinue_on_failure = false").unwrap();
        let path = file.path().with_extension("");
        let overrides = ProcessorConfig::from_file(path.to_str().unwrap()).unwrap();
        let mut config = ProcessorConfig::default();
        overrides.apply(&mut config);
        assert_eq!(config.max_concurrency, 4);
        assert!(!config.continue_on_failure);
    }
}
