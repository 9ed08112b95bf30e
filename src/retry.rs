//! Retry policy and backoff strategy.
//!
//! Generalizes the single exponential-with-jitter backoff computation into
//! the four named strategies a [`RetryPolicy`] may select between, all
//! capped at `max_delay`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ErrorCategory;
use crate::task::TaskOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    Exponential,
    ExponentialWithJitter,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            strategy: BackoffStrategy::Fixed,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self { max_attempts, base_delay, max_delay, strategy: BackoffStrategy::Exponential, jitter_factor: 0.0 }
    }

    pub fn exponential_with_jitter(max_attempts: u32, base_delay: Duration, max_delay: Duration, jitter_factor: f64) -> Self {
        Self { max_attempts, base_delay, max_delay, strategy: BackoffStrategy::ExponentialWithJitter, jitter_factor }
    }

    /// Delay to wait before attempt `attempt + 1`, where `attempt` is
    /// 1-based (the attempt that just failed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_millis = self.base_delay.as_millis() as f64;
        let raw = match self.strategy {
            BackoffStrategy::Fixed => base_millis,
            BackoffStrategy::Linear => base_millis * attempt as f64,
            BackoffStrategy::Exponential => base_millis * 2f64.powi(attempt as i32 - 1),
            BackoffStrategy::ExponentialWithJitter => {
                let exp = base_millis * 2f64.powi(attempt as i32 - 1);
                let jitter = 1.0 + (fastrand::f64() * 2.0 - 1.0) * self.jitter_factor;
                exp * jitter
            }
        };
        let capped = raw.max(0.0).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Whether an error of this category is eligible for another attempt
    /// under this policy, given attempts already made.
    pub fn should_retry(&self, attempts_made: u32, category: ErrorCategory) -> bool {
        attempts_made < self.max_attempts && category.is_retryable_by_default()
    }
}

/// Outcome of driving a factory through the retry loop.
pub struct RetryOutcome {
    pub result: anyhow::Result<TaskOutput>,
    pub attempt_number: u32,
}

/// Invokes `attempt` up to `policy.max_attempts` times, sleeping
/// `policy.delay_for(n)` between retryable failures. `attempt` receives the
/// 1-based attempt number and a cancellation scope; it is responsible for
/// its own per-call timeout (the retry loop itself only reacts to the
/// *outer* `cancel` token between attempts, per the backoff/timeout
/// interaction decided in the design notes).
pub async fn retry_with_backoff<F, Fut>(policy: &RetryPolicy, cancel: &CancellationToken, mut attempt: F) -> RetryOutcome
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = (anyhow::Result<TaskOutput>, ErrorCategory)>,
{
    let mut attempt_number = 0u32;
    loop {
        attempt_number += 1;
        let (result, category) = attempt(attempt_number).await;
        match &result {
            Ok(_) => return RetryOutcome { result, attempt_number },
            Err(_) if cancel.is_cancelled() => return RetryOutcome { result, attempt_number },
            Err(e) => {
                if policy.should_retry(attempt_number, category) {
                    let delay = policy.delay_for(attempt_number);
                    warn!(attempt = attempt_number, ?category, delay_ms = delay.as_millis() as u64, error = %e, "retrying task after failure");
                    tokio::select! {
                        _ = cancel.cancelled() => return RetryOutcome { result, attempt_number },
                        _ = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }
                info!(attempt = attempt_number, ?category, "giving up retrying task");
                return RetryOutcome { result, attempt_number };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_strategy_is_constant() {
        let p = RetryPolicy { strategy: BackoffStrategy::Fixed, base_delay: Duration::from_millis(50), ..Default::default() };
        assert_eq!(p.delay_for(1), Duration::from_millis(50));
        assert_eq!(p.delay_for(5), Duration::from_millis(50));
    }

    #[test]
    fn linear_strategy_scales_with_attempt() {
        let p = RetryPolicy { strategy: BackoffStrategy::Linear, base_delay: Duration::from_millis(10), ..Default::default() };
        assert_eq!(p.delay_for(3), Duration::from_millis(30));
    }

    #[test]
    fn exponential_strategy_doubles() {
        let p = RetryPolicy::exponential(5, Duration::from_millis(10), Duration::from_secs(10));
        assert_eq!(p.delay_for(1), Duration::from_millis(10));
        assert_eq!(p.delay_for(2), Duration::from_millis(20));
        assert_eq!(p.delay_for(3), Duration::from_millis(40));
    }

    #[test]
    fn delay_is_capped_at_max_delay() {
        let p = RetryPolicy::exponential(10, Duration::from_millis(100), Duration::from_millis(300));
        assert_eq!(p.delay_for(10), Duration::from_millis(300));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let p = RetryPolicy::exponential_with_jitter(5, Duration::from_millis(100), Duration::from_secs(10), 0.5);
        for attempt in 1..=4 {
            let d = p.delay_for(attempt).as_millis() as f64;
            let exp = 100.0 * 2f64.powi(attempt as i32 - 1);
            assert!(d >= exp * 0.5 - 1.0 && d <= exp * 1.5 + 1.0, "attempt {attempt}: {d} not within bounds of {exp}");
        }
    }

    #[test]
    fn should_retry_respects_max_attempts_and_category() {
        let p = RetryPolicy::exponential(3, Duration::from_millis(1), Duration::from_millis(10));
        assert!(p.should_retry(1, ErrorCategory::Network));
        assert!(!p.should_retry(3, ErrorCategory::Network));
        assert!(!p.should_retry(1, ErrorCategory::Validation));
    }

    #[tokio::test]
    async fn retry_loop_succeeds_on_third_attempt() {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(1), Duration::from_millis(5));
        let cancel = CancellationToken::new();
        let calls = std::sync::atomic::AtomicU32::new(0);
        let outcome = retry_with_backoff(&policy, &cancel, |_n| {
            let call = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if call < 2 {
                    (Err(anyhow::anyhow!("network blip")), ErrorCategory::Network)
                } else {
                    (Ok(std::sync::Arc::new(1u8) as TaskOutput), ErrorCategory::Network)
                }
            }
        })
        .await;
        assert!(outcome.result.is_ok());
        assert_eq!(outcome.attempt_number, 3);
    }
}
