use std::time::Duration;

/// Retries allowed after the initial replication attempt.
pub const MAX_ATTEMPTS: u32 = 5;

/// Exponential backoff for mirror replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay unit; the retry after attempt `n` waits `base * 2^n`.
    pub base: Duration,
    /// Retries allowed after the initial attempt.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max_attempts: MAX_ATTEMPTS,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self { base, max_attempts }
    }

    /// Delay before the retry that follows failed attempt `attempt` (0-based).
    /// delay = base * 2^attempt, saturating.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Whether a failed `attempt` leaves budget for another one.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Total pushes a permanently failing record receives.
    pub fn total_tries(&self) -> u32 {
        self.max_attempts + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_doubles_from_one_second() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = (0..5).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn budget_ends_at_max_attempts() {
        let policy = BackoffPolicy::default();
        assert!((0..5).all(|a| policy.should_retry(a)));
        assert!(!policy.should_retry(5));
        assert_eq!(policy.total_tries(), 6);
    }

    #[test]
    fn custom_base_scales_schedule() {
        let policy = BackoffPolicy::new(Duration::from_millis(250), 2);
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert!(!policy.should_retry(2));
    }

    #[test]
    fn huge_attempt_saturates() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(64), Duration::from_secs(1).saturating_mul(u32::MAX));
    }
}
