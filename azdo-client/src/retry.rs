//! Retry budget and backoff for a single API call.

use std::time::Duration;

use rand::Rng;

/// Retry configuration shared by every call of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts per call, the first one included.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on every further attempt.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Exponential delay after `attempt` failed attempts (1-based), before jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Attempt counter for one call. Dropped when the call completes.
#[derive(Debug)]
pub(crate) struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    pub(crate) fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Register the start of an attempt and return its 1-based number.
    pub(crate) fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether the budget allows another attempt after the current one.
    pub(crate) fn can_retry(&self) -> bool {
        self.attempt < self.policy.max_attempts.max(1)
    }

    /// Delay before the next attempt: jittered exponential backoff, raised to
    /// the server's `Retry-After` hint when one was given, capped at `max_delay`.
    pub(crate) fn next_delay(&self, retry_after: Option<Duration>) -> Duration {
        let backoff = jitter(self.policy.backoff(self.attempt));
        match retry_after {
            Some(hint) => hint.max(backoff).min(self.policy.max_delay),
            None => backoff,
        }
    }
}

/// Randomize a delay into `[delay / 2, delay]`.
fn jitter(delay: Duration) -> Duration {
    let max = delay.as_millis() as u64;
    if max < 2 {
        return delay;
    }
    Duration::from_millis(rand::rng().random_range(max / 2..=max))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = policy(5);
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(400));
        assert_eq!(p.backoff(4), Duration::from_millis(800));
        assert_eq!(p.backoff(5), Duration::from_millis(1000));
        assert_eq!(p.backoff(60), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        for _ in 0..100 {
            let d = jitter(Duration::from_millis(400));
            assert!(d >= Duration::from_millis(200) && d <= Duration::from_millis(400));
        }
    }

    #[test]
    fn test_budget_counts_first_attempt() {
        let mut state = RetryState::new(policy(3));

        assert_eq!(state.begin_attempt(), 1);
        assert!(state.can_retry());
        assert_eq!(state.begin_attempt(), 2);
        assert!(state.can_retry());
        assert_eq!(state.begin_attempt(), 3);
        assert!(!state.can_retry());
    }

    #[test]
    fn test_zero_budget_still_allows_one_attempt() {
        let mut state = RetryState::new(policy(0));
        state.begin_attempt();
        assert!(!state.can_retry());
        assert_eq!(state.attempt(), 1);
    }

    #[test]
    fn test_retry_after_hint_is_respected_and_capped() {
        let mut state = RetryState::new(policy(5));
        state.begin_attempt();

        let delay = state.next_delay(Some(Duration::from_millis(700)));
        assert_eq!(delay, Duration::from_millis(700));

        let delay = state.next_delay(Some(Duration::from_secs(120)));
        assert_eq!(delay, Duration::from_millis(1000));
    }
}
