//! Per-task telemetry records and the pure summary function over them.

use chrono::{DateTime, Utc};

/// One record per terminal task completion (after any retries).
#[derive(Debug, Clone)]
pub struct TaskTelemetry {
    pub task_name: String,
    pub elapsed_ms: u64,
    pub is_successful: bool,
    pub error_type_name: Option<String>,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate statistics over a telemetry snapshot. A pure function of its
/// input: identical snapshots always yield identical summaries.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySummary {
    pub total_tasks: usize,
    pub successful: usize,
    pub failed: usize,
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub total_ms: u64,
    pub success_rate: f64,
}

pub fn summarize(records: &[TaskTelemetry]) -> TelemetrySummary {
    if records.is_empty() {
        return TelemetrySummary { total_tasks: 0, successful: 0, failed: 0, avg_ms: 0.0, min_ms: 0, max_ms: 0, total_ms: 0, success_rate: 0.0 };
    }
    let total_tasks = records.len();
    let successful = records.iter().filter(|r| r.is_successful).count();
    let failed = total_tasks - successful;
    let total_ms: u64 = records.iter().map(|r| r.elapsed_ms).sum();
    let min_ms = records.iter().map(|r| r.elapsed_ms).min().unwrap_or(0);
    let max_ms = records.iter().map(|r| r.elapsed_ms).max().unwrap_or(0);
    let avg_ms = total_ms as f64 / total_tasks as f64;
    let success_rate = successful as f64 / total_tasks as f64 * 100.0;
    TelemetrySummary { total_tasks, successful, failed, avg_ms, min_ms, max_ms, total_ms, success_rate }
}

/// Opaque destination for a run's accumulated telemetry, invoked at most
/// once per run. Export failures are logged and swallowed by the caller —
/// this type itself carries no error-handling obligation.
pub type TelemetryExporter = std::sync::Arc<dyn Fn(&[TaskTelemetry]) -> anyhow::Result<()> + Send + Sync>;
