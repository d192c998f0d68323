use std::time::Duration;
use tokio::task::yield_now;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Per-worker pacing delay.
///
/// After `k` consecutive failures the delay is `min(max, min * 2^k)`; a success resets it to `min`.
#[derive(Debug, Clone)]
pub struct BackoffState {
    current: Duration,
    min: Duration,
    max: Duration,
    consecutive_failures: u32,
}

impl BackoffState {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            current: min,
            min,
            max: max.max(min),
            consecutive_failures: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        self.current
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn on_success(&mut self) {
        self.current = self.min;
        self.consecutive_failures = 0;
    }

    /// Doubles the delay (capped) and returns it.
    pub fn on_failure(&mut self) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.current = next_backoff(self.current, self.max);
        self.current
    }
}

fn next_backoff(current: Duration, max_backoff: Duration) -> Duration {
    if current.is_zero() {
        return max_backoff.min(Duration::from_millis(1));
    }

    current.saturating_mul(2).min(max_backoff)
}

/// Sleeps for `delay` unless `token` fires first. Returns `false` when cancelled.
pub(crate) async fn sleep_with_cancellation(delay: Duration, token: &CancellationToken) -> bool {
    if delay.is_zero() {
        yield_now().await;
        return !token.is_cancelled();
    }

    tokio::select! {
        _ = token.cancelled() => false,
        _ = sleep(delay) => true,
    }
}
