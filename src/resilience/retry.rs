//! Bounded exponential backoff, configured per detector.
//!
//! Retries are skipped once the owning pipeline deadline would not survive
//! one more backoff interval — a detector should never retry itself
//! past the point where the caller has already stopped waiting.

use std::time::Duration;

/// Maximum attempts, base delay, and growth multiplier for a detector's retry
/// behavior against one upstream.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: f64,
}

impl RetryPolicy {
    /// `max_attempts` is the number of *retries* after the first attempt — a
    /// policy built with `max_attempts = 0` never retries.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier: multiplier.max(1.0),
        }
    }

    /// A policy that never retries — the first failure is final.
    #[must_use]
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, 1.0)
    }

    /// The backoff to sleep before attempt `attempt + 1` (0-indexed).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(self.base_delay.as_secs_f64() * factor)
    }

    /// Whether another attempt should be made after `attempt` (0-indexed) has
    /// failed, given `deadline` — the time remaining on the owning pipeline
    /// call, if any.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, deadline: Option<Duration>) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        match deadline {
            Some(remaining) => remaining > self.backoff(attempt),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), 2.0);
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
    }

    #[test]
    fn stops_after_max_attempts() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10), 2.0);
        assert!(policy.should_retry(0, None));
        assert!(policy.should_retry(1, None));
        assert!(!policy.should_retry(2, None));
    }

    #[test]
    fn skips_retry_within_one_backoff_interval_of_deadline() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), 2.0);
        assert!(!policy.should_retry(0, Some(Duration::from_millis(50))));
        assert!(policy.should_retry(0, Some(Duration::from_millis(150))));
    }

    #[test]
    fn none_policy_never_retries() {
        assert!(!RetryPolicy::none().should_retry(0, None));
    }
}
