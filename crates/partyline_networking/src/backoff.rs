//! # Reconnect Backoff
//!
//! `delay = min(cap, initial * 2^attempt + jitter)`, jitter uniform in
//! `[0, max_jitter)`.

use std::time::Duration;

use partyline_shared::constants::{DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY, MAX_JITTER_MS};
use rand::Rng;

/// Exponent ceiling; `2^30` times any sane base is already past every cap.
const MAX_EXPONENT: u32 = 30;

/// Exponential backoff with additive jitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first reconnect.
    pub initial_delay: Duration,
    /// Upper bound of any delay, jitter included.
    pub max_delay: Duration,
    /// Exclusive upper bound of the random jitter.
    pub max_jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl BackoffPolicy {
    /// Creates a policy with the standard jitter range.
    #[must_use]
    pub const fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_jitter: Duration::from_millis(MAX_JITTER_MS),
        }
    }

    /// Disables jitter.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.max_jitter = Duration::ZERO;
        self
    }

    /// Delay before reconnect number `attempt` (0-based), jittered.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
        };
        self.delay_with_jitter(attempt, jitter)
    }

    /// Delay for `attempt` with a caller-chosen jitter.
    #[must_use]
    pub fn delay_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        self.exponential(attempt)
            .saturating_add(jitter)
            .min(self.max_delay)
    }

    /// Delay for `attempt` with no jitter at all.
    #[inline]
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        self.exponential(attempt).min(self.max_delay)
    }

    fn exponential(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_EXPONENT);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_millis(800), Duration::from_secs(20))
    }

    #[test]
    fn test_delay_bounds() {
        let policy = policy();
        for attempt in 0..12 {
            let lower = policy.base_delay(attempt);
            for _ in 0..50 {
                let delay = policy.delay(attempt);
                assert!(delay <= policy.max_delay, "attempt {attempt}: {delay:?}");
                assert!(delay >= lower, "attempt {attempt}: {delay:?} < {lower:?}");
            }
        }
    }

    #[test]
    fn test_exponential_growth() {
        let policy = policy();
        assert_eq!(policy.base_delay(0), Duration::from_millis(800));
        assert_eq!(policy.base_delay(1), Duration::from_millis(1600));
        assert_eq!(policy.base_delay(4), Duration::from_millis(12_800));
        assert_eq!(policy.base_delay(5), Duration::from_secs(20));
    }

    #[test]
    fn test_jitter_added_then_capped() {
        let policy = policy();
        assert_eq!(
            policy.delay_with_jitter(0, Duration::from_millis(150)),
            Duration::from_millis(950)
        );
        assert_eq!(
            policy.delay_with_jitter(4, Duration::from_millis(199)),
            Duration::from_millis(12_999)
        );
        assert_eq!(
            policy.delay_with_jitter(10, Duration::from_millis(199)),
            Duration::from_secs(20)
        );
    }

    #[test]
    fn test_monotonic_without_jitter() {
        let policy = policy();
        let delays: Vec<_> = (0..20).map(|attempt| policy.base_delay(attempt)).collect();
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let policy = policy();
        assert_eq!(policy.base_delay(u32::MAX), Duration::from_secs(20));
        assert_eq!(policy.without_jitter().delay(u32::MAX), Duration::from_secs(20));
    }
}
