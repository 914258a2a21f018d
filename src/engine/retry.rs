//! Exponential backoff between failed attempts.

use chrono::{DateTime, Utc};
use std::time::Duration;

const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Retry delay policy: `backoff_base ^ attempts` time units, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff_base: u32,
    /// Length of one backoff time unit.
    pub unit: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(backoff_base: u32) -> Self {
        Self {
            backoff_base,
            unit: Duration::from_secs(1),
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    pub fn unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before the next attempt, given the failed attempts so far.
    pub fn delay(&self, attempts: u32) -> Duration {
        let factor = u64::from(self.backoff_base)
            .checked_pow(attempts)
            .and_then(|f| u32::try_from(f).ok());
        factor
            .and_then(|f| self.unit.checked_mul(f))
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Earliest time the job may be claimed again.
    pub fn retry_at(&self, attempts: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.delay(attempts))
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_is_base_to_the_attempts() {
        let policy = RetryPolicy::new(2);
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(3), Duration::from_secs(8));

        let policy = RetryPolicy::new(3).unit(Duration::from_millis(10));
        assert_eq!(policy.delay(2), Duration::from_millis(90));
    }

    #[test]
    fn delay_saturates_at_max() {
        let policy = RetryPolicy::new(10).max_delay(Duration::from_secs(60));
        assert_eq!(policy.delay(1), Duration::from_secs(10));
        assert_eq!(policy.delay(2), Duration::from_secs(60));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn retry_at_adds_delay() {
        let now = Utc::now();
        let at = RetryPolicy::new(2).retry_at(1, now);
        assert_eq!(at - now, chrono::Duration::seconds(2));
    }
}
