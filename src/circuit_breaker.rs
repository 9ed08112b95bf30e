//! Three-state circuit breaker: Closed -> Open -> HalfOpen -> Closed/Open.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerOptions {
    pub failure_threshold: u32,
    pub time_window: Duration,
    pub open_duration: Duration,
}

impl Default for CircuitBreakerOptions {
    fn default() -> Self {
        Self { failure_threshold: 5, time_window: Duration::from_secs(60), open_duration: Duration::from_secs(30) }
    }
}

enum Inner {
    Closed { failures: VecDeque<Instant> },
    Open { opened_at: Instant },
    HalfOpen,
}

pub struct CircuitBreaker {
    options: CircuitBreakerOptions,
    state: RwLock<Inner>,
}

impl CircuitBreaker {
    pub fn new(options: CircuitBreakerOptions) -> Self {
        Self { options, state: RwLock::new(Inner::Closed { failures: VecDeque::new() }) }
    }

    /// Whether a call may be admitted right now. Transitions Open ->
    /// HalfOpen when `open_duration` has elapsed; the transition itself is
    /// the one HalfOpen probe admission.
    pub async fn try_admit(&self) -> bool {
        let mut state = self.state.write().await;
        match &*state {
            Inner::Closed { .. } => true,
            Inner::HalfOpen => false,
            Inner::Open { opened_at } => {
                if opened_at.elapsed() >= self.options.open_duration {
                    info!("circuit breaker half-opening after cooldown");
                    *state = Inner::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        match &*state {
            Inner::HalfOpen => {
                info!("circuit breaker closing after successful probe");
                *state = Inner::Closed { failures: VecDeque::new() };
            }
            Inner::Closed { .. } => {
                *state = Inner::Closed { failures: VecDeque::new() };
            }
            Inner::Open { .. } => {}
        }
    }

    pub async fn record_failure(&self) {
        let mut state = self.state.write().await;
        match &mut *state {
            Inner::HalfOpen => {
                warn!("circuit breaker reopening: probe failed");
                *state = Inner::Open { opened_at: Instant::now() };
            }
            Inner::Closed { failures } => {
                let now = Instant::now();
                failures.push_back(now);
                while let Some(front) = failures.front() {
                    if now.duration_since(*front) > self.options.time_window {
                        failures.pop_front();
                    } else {
                        break;
                    }
                }
                if failures.len() as u32 >= self.options.failure_threshold {
                    warn!(failures = failures.len(), "circuit breaker opening");
                    *state = Inner::Open { opened_at: now };
                }
            }
            Inner::Open { .. } => {}
        }
    }

    pub async fn stats(&self) -> CircuitBreakerStats {
        let state = self.state.read().await;
        match &*state {
            Inner::Closed { failures } => {
                CircuitBreakerStats { state: BreakerState::Closed, consecutive_failures: failures.len() as u32, opened_at: None }
            }
            Inner::Open { opened_at } => CircuitBreakerStats {
                state: BreakerState::Open,
                consecutive_failures: self.options.failure_threshold,
                opened_at: Some(instant_to_utc(*opened_at)),
            },
            Inner::HalfOpen => CircuitBreakerStats { state: BreakerState::HalfOpen, consecutive_failures: 0, opened_at: None },
        }
    }
}

/// Best-effort conversion for reporting purposes only; the breaker's actual
/// timing decisions are made on the monotonic `Instant` clock above.
fn instant_to_utc(instant: Instant) -> DateTime<Utc> {
    let now_instant = Instant::now();
    let now_utc = Utc::now();
    if instant <= now_instant {
        now_utc - chrono::Duration::from_std(now_instant.duration_since(instant)).unwrap_or_default()
    } else {
        now_utc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(CircuitBreakerOptions {
            failure_threshold: 3,
            time_window: Duration::from_secs(1),
            open_duration: Duration::from_millis(50),
        });
        for _ in 0..3 {
            assert!(breaker.try_admit().await);
            breaker.record_failure().await;
        }
        assert!(!breaker.try_admit().await);
        assert_eq!(breaker.stats().await.state, BreakerState::Open);
    }

    #[tokio::test]
    async fn half_opens_then_closes_on_success() {
        let breaker = CircuitBreaker::new(CircuitBreakerOptions {
            failure_threshold: 1,
            time_window: Duration::from_secs(1),
            open_duration: Duration::from_millis(10),
        });
        breaker.record_failure().await;
        assert!(!breaker.try_admit().await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(breaker.try_admit().await);
        breaker.record_success().await;
        assert_eq!(breaker.stats().await.state, BreakerState::Closed);
    }

    #[tokio::test]
    async fn half_open_probe_failure_reopens() {
        let breaker = CircuitBreaker::new(CircuitBreakerOptions {
            failure_threshold: 1,
            time_window: Duration::from_secs(1),
            open_duration: Duration::from_millis(10),
        });
        breaker.record_failure().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(breaker.try_admit().await);
        breaker.record_failure().await;
        assert_eq!(breaker.stats().await.state, BreakerState::Open);
    }

    #[tokio::test]
    async fn failures_outside_window_do_not_accumulate() {
        let breaker = CircuitBreaker::new(CircuitBreakerOptions {
            failure_threshold: 2,
            time_window: Duration::from_millis(20),
            open_duration: Duration::from_secs(1),
        });
        breaker.record_failure().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        breaker.record_failure().await;
        assert_eq!(breaker.stats().await.state, BreakerState::Closed);
    }
}
