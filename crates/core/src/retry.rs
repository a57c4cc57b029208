//! Retry policies with backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Exponential backoff: base * 2^(attempt-1)
    Exponential,
    /// Linear backoff: base * attempt
    Linear,
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential
    }
}

/// Retry policy configuration.
///
/// `max_retries` counts *additional* attempts after the first one, so the
/// total attempt bound is `max_retries + 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt (0 = no retries)
    pub max_retries: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    /// Backoff strategy
    pub strategy: BackoffStrategy,
    /// Jitter factor (0.0-1.0) to spread retries out
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Create a policy with fixed delays.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    /// Create a policy with exponential backoff.
    pub fn exponential(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }

    /// Calculate the delay after a failed attempt (1-indexed).
    ///
    /// The jitter is deterministic, derived from `seed` and the attempt
    /// number. Seeding with the execution's id spreads retries of distinct
    /// executions apart while keeping every schedule reproducible in tests.
    pub fn delay_for_attempt(&self, attempt: u32, seed: u64) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Exponential => {
                let exp = 2_f64.powi((attempt - 1) as i32);
                (base_ms * exp).min(max_ms)
            }
            BackoffStrategy::Linear => {
                let linear = base_ms * (attempt as f64);
                linear.min(max_ms)
            }
        };

        let jitter_range = delay_ms * self.jitter;
        let jitter = if jitter_range > 0.0 {
            jitter_range * jitter_unit(seed, attempt)
        } else {
            0.0
        };

        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }

    /// Check whether another retry is allowed after `attempts_made` attempts.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made <= self.max_retries
    }

    /// Total attempt bound (initial attempt plus retries).
    pub fn attempt_bound(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Deterministic value in [-1, 1] mixed from the seed and attempt number.
fn jitter_unit(seed: u64, attempt: u32) -> f64 {
    let mut x = seed ^ (u64::from(attempt)).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    x ^= x >> 33;
    x = x.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    x ^= x >> 33;
    ((x % 2001) as f64 / 1000.0) - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.0,
        };

        assert_eq!(policy.delay_for_attempt(1, 0), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2, 0), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3, 0), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(4, 0), Duration::from_secs(16));
    }

    #[test]
    fn exponential_backoff_caps_at_max() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.0,
        };

        assert_eq!(policy.delay_for_attempt(8, 0), Duration::from_secs(10));
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(500));

        assert_eq!(policy.delay_for_attempt(1, 7), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2, 7), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(3, 7), Duration::from_millis(500));
    }

    #[test]
    fn linear_backoff_increases_linearly() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            strategy: BackoffStrategy::Linear,
            jitter: 0.0,
        };

        assert_eq!(policy.delay_for_attempt(1, 0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2, 0), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3, 0), Duration::from_millis(300));
    }

    #[test]
    fn should_retry_respects_bound() {
        let policy = RetryPolicy {
            max_retries: 3,
            ..Default::default()
        };

        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(policy.should_retry(3));
        assert!(!policy.should_retry(4));
        assert_eq!(policy.attempt_bound(), 4);
    }

    #[test]
    fn jitter_is_deterministic_and_bounded() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        };

        let a = policy.delay_for_attempt(1, 42);
        let b = policy.delay_for_attempt(1, 42);
        assert_eq!(a, b);

        // within ±10% of the 2s base
        assert!(a >= Duration::from_millis(1800));
        assert!(a <= Duration::from_millis(2200));

        // different seeds spread out
        let c = policy.delay_for_attempt(1, 43);
        let d = policy.delay_for_attempt(1, 44);
        assert!(a != c || a != d);
    }
}
