//! Pooled result objects: a reset-and-return pattern for the mutable
//! scratch space the pipeline fills in while running a single task.
//!
//! Acquired on pipeline entry, mutated in place, then defensive-copied into
//! a fresh, non-pooled [`crate::task::TaskResult`] published to the result
//! collection before the pooled object is returned — so no reader ever
//! observes a value that is still being mutated or that has gone back to
//! the pool. Purely a tuning knob: a conforming caller may disable pooling
//! entirely (`enable_memory_pooling = false`) and allocate a fresh scratch
//! object per task instead.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::ErrorCategory;
use crate::task::{TaskMetadata, TaskOutput, TaskResult};

/// Mutable scratch space for one in-flight task's result, before it is
/// published.
#[derive(Default)]
pub struct PooledResult {
    pub name: String,
    pub data: Option<TaskOutput>,
    pub is_successful: bool,
    pub error_message: Option<String>,
    pub error_category: Option<ErrorCategory>,
    pub is_retryable: bool,
    pub attempt_number: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub execution_time: Duration,
    pub metadata: TaskMetadata,
}

impl PooledResult {
    pub fn reset(&mut self) {
        self.name.clear();
        self.data = None;
        self.is_successful = false;
        self.error_message = None;
        self.error_category = None;
        self.is_retryable = false;
        self.attempt_number = 0;
        self.start_time = None;
        self.execution_time = Duration::ZERO;
        self.metadata = HashMap::new();
    }

    /// Defensive copy into a fresh, independently-owned [`TaskResult`].
    pub fn publish(&self) -> TaskResult {
        TaskResult {
            name: self.name.clone(),
            data: self.data.clone(),
            is_successful: self.is_successful,
            error_message: self.error_message.clone(),
            error_category: self.error_category,
            is_retryable: self.is_retryable,
            attempt_number: self.attempt_number,
            start_time: self.start_time.unwrap_or_else(Utc::now),
            timestamp: Utc::now(),
            execution_time: self.execution_time,
            metadata: self.metadata.clone(),
        }
    }
}

/// Bounded pool of [`PooledResult`] scratch objects. Acquisition beyond the
/// retained set simply allocates a fresh object; returns beyond capacity
/// are discarded rather than causing backpressure.
pub struct ResultPool {
    capacity: usize,
    items: Mutex<Vec<PooledResult>>,
}

impl ResultPool {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, items: Mutex::new(Vec::with_capacity(capacity)) }
    }

    pub async fn acquire(&self) -> PooledResult {
        let mut items = self.items.lock().await;
        items.pop().unwrap_or_default()
    }

    pub async fn release(&self, mut item: PooledResult) {
        item.reset();
        let mut items = self.items.lock().await;
        if items.len() < self.capacity {
            items.push(item);
        }
    }
}
