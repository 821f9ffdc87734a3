//! Retry and polling schedules.
//!
//! Two schedules matter to the engine:
//! - double-check polling after an exchange effect: 250 ms, 500 ms, 1 s,
//!   2 s, 4 s (5 attempts)
//! - transient retry: 250 ms, 1 s, 4 s (3 attempts)
//!
//! Rate-limited retries multiply the delay by a uniform jitter factor so a
//! fleet of jobs does not re-hit the venue in lockstep.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub factor: u32,
    pub max_attempts: u32,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl ExponentialBackoff {
    /// Polling schedule for the double-check phase of an atomic job.
    pub fn double_check() -> Self {
        Self {
            initial: Duration::from_millis(250),
            factor: 2,
            max_attempts: 5,
            max_delay: Duration::from_secs(4),
            jitter: false,
        }
    }

    /// Retry schedule for transient failures.
    pub fn transient() -> Self {
        Self {
            initial: Duration::from_millis(250),
            factor: 4,
            max_attempts: 3,
            max_delay: Duration::from_secs(4),
            jitter: false,
        }
    }

    /// Longer, jittered schedule for rate-limit rejections.
    pub fn rate_limited() -> Self {
        Self {
            initial: Duration::from_secs(1),
            factor: 3,
            max_attempts: 3,
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }

    /// Delay before retry number `attempt` (0-based), or `None` once the
    /// schedule is exhausted. The returned delay excludes jitter.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = self.factor.checked_pow(attempt).unwrap_or(u32::MAX);
        let delay = self
            .initial
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        Some(delay)
    }

    /// Sleep before retry number `attempt`, applying jitter when configured.
    /// Returns false once the schedule is exhausted.
    pub async fn wait(&self, attempt: u32) -> bool {
        let Some(delay) = self.delay(attempt) else {
            return false;
        };
        let delay = if self.jitter {
            let factor = rand::rng().random_range(0.5..1.5);
            delay.mul_f64(factor)
        } else {
            delay
        };
        tokio::time::sleep(delay).await;
        true
    }

    /// Sleep honouring a venue retry-after hint (seconds) over the schedule
    /// delay when the hint is longer.
    pub async fn wait_hinted(&self, attempt: u32, retry_after: Option<u64>) -> bool {
        let Some(delay) = self.delay(attempt) else {
            return false;
        };
        let hinted = retry_after
            .map(Duration::from_secs)
            .filter(|hint| *hint > delay)
            .unwrap_or(delay);
        let hinted = if self.jitter {
            hinted.mul_f64(rand::rng().random_range(1.0..1.5))
        } else {
            hinted
        };
        tokio::time::sleep(hinted).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_check_schedule_matches_budgets() {
        let backoff = ExponentialBackoff::double_check();
        let delays: Vec<_> = (0..6).map(|attempt| backoff.delay(attempt)).collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_millis(250)),
                Some(Duration::from_millis(500)),
                Some(Duration::from_secs(1)),
                Some(Duration::from_secs(2)),
                Some(Duration::from_secs(4)),
                None,
            ]
        );
    }

    #[test]
    fn transient_schedule_matches_budgets() {
        let backoff = ExponentialBackoff::transient();
        assert_eq!(backoff.delay(0), Some(Duration::from_millis(250)));
        assert_eq!(backoff.delay(1), Some(Duration::from_secs(1)));
        assert_eq!(backoff.delay(2), Some(Duration::from_secs(4)));
        assert_eq!(backoff.delay(3), None);
    }

    #[test]
    fn delay_is_capped() {
        let backoff = ExponentialBackoff {
            initial: Duration::from_secs(10),
            factor: 10,
            max_attempts: 10,
            max_delay: Duration::from_secs(30),
            jitter: false,
        };
        assert_eq!(backoff.delay(5), Some(Duration::from_secs(30)));
    }
}
