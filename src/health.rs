//! Health check: a cheap, synchronous judgement over the current run
//! summary and breaker state, for hosts that want a liveness/readiness
//! signal without scraping full telemetry.

use crate::circuit_breaker::{BreakerState, CircuitBreakerStats};
use crate::config::HealthCheckOptions;
use crate::telemetry::TelemetrySummary;

#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub is_healthy: bool,
    pub message: String,
}

pub fn check(options: &HealthCheckOptions, summary: &TelemetrySummary, breaker: Option<&CircuitBreakerStats>) -> HealthReport {
    if let Some(stats) = breaker {
        if stats.state == BreakerState::Open {
            return HealthReport { is_healthy: false, message: "circuit breaker is open".to_string() };
        }
    }

    if summary.total_tasks > 0 && summary.success_rate < options.min_success_rate {
        return HealthReport {
            is_healthy: false,
            message: format!("success rate {:.1}% is below the {:.1}% threshold", summary.success_rate, options.min_success_rate),
        };
    }

    if summary.total_tasks > 0 && summary.avg_ms as f64 > options.max_avg_execution_time.as_millis() as f64 {
        return HealthReport {
            is_healthy: false,
            message: format!("average execution time {:.0}ms exceeds the {}ms threshold", summary.avg_ms, options.max_avg_execution_time.as_millis()),
        };
    }

    HealthReport { is_healthy: true, message: "ok".to_string() }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn summary(total: usize, success_rate: f64, avg_ms: f64) -> TelemetrySummary {
        TelemetrySummary { total_tasks: total, successful: 0, failed: 0, avg_ms, min_ms: 0, max_ms: 0, total_ms: 0, success_rate }
    }

    #[test]
    fn empty_run_is_healthy_by_definition() {
        let options = HealthCheckOptions::default();
        let report = check(&options, &summary(0, 0.0, 0.0), None);
        assert!(report.is_healthy);
    }

    #[test]
    fn low_success_rate_is_unhealthy() {
        let options = HealthCheckOptions { min_success_rate: 80.0, ..HealthCheckOptions::default() };
        let report = check(&options, &summary(10, 40.0, 1.0), None);
        assert!(!report.is_healthy);
    }

    #[test]
    fn open_breaker_is_unhealthy_even_with_perfect_success_rate() {
        let options = HealthCheckOptions::default();
        let stats = CircuitBreakerStats { state: BreakerState::Open, consecutive_failures: 5, opened_at: None };
        let report = check(&options, &summary(10, 100.0, 1.0), Some(&stats));
        assert!(!report.is_healthy);
    }
}
