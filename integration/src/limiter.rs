//! Per-account weighted rate limiting.
//!
//! Venues charge each endpoint a weight against a per-account budget; the
//! limiter is a token bucket refilled continuously at the account's budget
//! per minute. Every adapter call acquires its request weight before hitting
//! the wire, so one account can never exceed its venue allowance no matter
//! how many jobs run concurrently.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug)]
pub struct AccountRateLimiter {
    capacity_per_minute: u32,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    available: f64,
    last_refill: Instant,
}

impl AccountRateLimiter {
    pub fn new(capacity_per_minute: u32) -> Self {
        Self {
            capacity_per_minute,
            state: Mutex::new(BucketState {
                available: capacity_per_minute as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill_rate_per_second(&self) -> f64 {
        self.capacity_per_minute as f64 / 60.0
    }

    /// Acquire `weight` tokens, sleeping until the bucket refills when the
    /// budget is exhausted.
    pub async fn acquire(&self, weight: u32) {
        let weight = weight as f64;
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.available = (state.available + elapsed * self.refill_rate_per_second())
                    .min(self.capacity_per_minute as f64);
                state.last_refill = now;

                if state.available >= weight {
                    state.available -= weight;
                    return;
                }
                let deficit = weight - state.available;
                Duration::from_secs_f64(deficit / self.refill_rate_per_second())
            };
            trace!(wait_ms = wait.as_millis() as u64, "account rate limit hit");
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquires_within_budget_without_waiting() {
        let limiter = AccountRateLimiter::new(1200);
        let start = Instant::now();
        for _ in 0..10 {
            limiter.acquire(5).await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn waits_when_budget_exhausted() {
        // 6000/min refills 100 tokens per second
        let limiter = AccountRateLimiter::new(6000);
        limiter.acquire(6000).await;
        let start = Instant::now();
        limiter.acquire(10).await;
        assert!(start.elapsed() >= Duration::from_millis(80));
    }
}
