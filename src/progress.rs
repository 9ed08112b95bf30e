//! Progress tracking: atomic completed/total counters plus ETA estimation.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct TaskProgress {
    pub completed_tasks: usize,
    pub total_tasks: usize,
    pub current_task_name: Option<String>,
    pub elapsed: Duration,
    pub estimated_time_remaining: Option<Duration>,
    pub success_rate: f64,
}

impl TaskProgress {
    pub fn completion_percentage(&self) -> f64 {
        if self.total_tasks == 0 {
            0.0
        } else {
            self.completed_tasks as f64 / self.total_tasks as f64 * 100.0
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_tasks >= self.total_tasks
    }

    pub fn remaining_tasks(&self) -> usize {
        self.total_tasks.saturating_sub(self.completed_tasks)
    }
}

struct State {
    completed: usize,
    total: usize,
    successful: usize,
    current_task_name: Option<String>,
    started_at: Instant,
}

/// Owned by a single run. Updated after each task terminates; never shared
/// across concurrent runs on the same processor (see the design notes on
/// multi-run interleaving).
pub struct ProgressTracker {
    state: Mutex<State>,
}

impl ProgressTracker {
    pub fn new(total_tasks: usize) -> Self {
        Self { state: Mutex::new(State { completed: 0, total: total_tasks, successful: 0, current_task_name: None, started_at: Instant::now() }) }
    }

    pub async fn record_completion(&self, task_name: &str, succeeded: bool) -> TaskProgress {
        let mut state = self.state.lock().await;
        state.completed += 1;
        if succeeded {
            state.successful += 1;
        }
        state.current_task_name = Some(task_name.to_string());
        self.snapshot_locked(&state)
    }

    pub async fn snapshot(&self) -> TaskProgress {
        let state = self.state.lock().await;
        self.snapshot_locked(&state)
    }

    fn snapshot_locked(&self, state: &State) -> TaskProgress {
        let elapsed = state.started_at.elapsed();
        let estimated_time_remaining = if state.completed > 0 && state.completed < state.total {
            let per_task = elapsed.as_secs_f64() / state.completed as f64;
            Some(Duration::from_secs_f64(per_task * (state.total - state.completed) as f64))
        } else {
            None
        };
        let success_rate = if state.completed > 0 { state.successful as f64 / state.completed as f64 * 100.0 } else { 0.0 };
        TaskProgress {
            completed_tasks: state.completed,
            total_tasks: state.total,
            current_task_name: state.current_task_name.clone(),
            elapsed,
            estimated_time_remaining,
            success_rate,
        }
    }
}
