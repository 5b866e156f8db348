// src/engine/backoff.rs

//! Restart delay policy.
//!
//! The delay before restart number `n` (0-indexed) is `first × factor^n`,
//! clamped to `max`. With `factor >= 1.0` the sequence is monotonic
//! non-decreasing, which is what the monitor relies on. There is no jitter:
//! supervised processes restart independently, so there is no herd to
//! spread out.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first restart.
    pub first: Duration,
    /// Cap for any single delay.
    pub max: Duration,
    /// Multiplicative growth per consecutive failure (`>= 1.0`).
    pub factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(5),
            factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// No delay at all between restarts.
    pub fn immediate() -> Self {
        Self {
            first: Duration::ZERO,
            max: Duration::ZERO,
            factor: 1.0,
        }
    }

    /// Delay before restart number `attempt` (0-indexed).
    pub fn next(&self, attempt: u32) -> Duration {
        if self.first.is_zero() {
            return Duration::ZERO;
        }

        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.max(1.0).powi(exp);

        if !secs.is_finite() || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy(first_ms: u64, max_ms: u64, factor: f64) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(first_ms),
            max: Duration::from_millis(max_ms),
            factor,
        }
    }

    #[test]
    fn exponential_growth_until_cap() {
        let p = policy(100, 1_000, 2.0);
        assert_eq!(p.next(0), Duration::from_millis(100));
        assert_eq!(p.next(1), Duration::from_millis(200));
        assert_eq!(p.next(2), Duration::from_millis(400));
        assert_eq!(p.next(3), Duration::from_millis(800));
        assert_eq!(p.next(4), Duration::from_secs(1));
        assert_eq!(p.next(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn first_above_max_is_clamped() {
        let p = policy(10_000, 5_000, 2.0);
        assert_eq!(p.next(0), Duration::from_secs(5));
    }

    #[test]
    fn immediate_never_waits() {
        let p = BackoffPolicy::immediate();
        assert_eq!(p.next(0), Duration::ZERO);
        assert_eq!(p.next(50), Duration::ZERO);
    }

    proptest! {
        #[test]
        fn delays_never_decrease(
            first_ms in 0u64..10_000,
            max_ms in 0u64..60_000,
            factor in 1.0f64..4.0,
            attempt in 0u32..200,
        ) {
            let p = policy(first_ms, max_ms, factor);
            let a = p.next(attempt);
            let b = p.next(attempt + 1);
            prop_assert!(b >= a, "attempt {}: {:?} then {:?}", attempt, a, b);
            prop_assert!(b <= p.max);
        }
    }
}
