//! Bounded exponential backoff for chunk commit retries.
//!
//! Design notes:
//! - A `RetryPolicy` is cheap to clone and owns no state; each commit takes
//!   a fresh `RetryHandle` so attempt counting never leaks across chunks.
//! - Jitter spreads concurrent sessions hammering a degraded store.

use std::time::Duration;

use rand::Rng;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_fraction: f64,
}

impl RetryPolicy {
    /// Exponential schedule: base, 2*base, 4*base, ... capped at `max_delay`.
    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter_fraction: 0.0,
        }
    }

    /// Randomize each delay by +/- `fraction` (clamped to [0, 1]).
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn handle(&self) -> RetryHandle {
        RetryHandle {
            policy: self.clone(),
            attempts: 0,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let shift = attempt.saturating_sub(1).min(31);
        let scaled = self.base_delay.as_millis().saturating_mul(1u128 << shift);
        let raw = Duration::from_millis(scaled.min(u128::from(u64::MAX)) as u64);
        let bounded = raw.min(self.max_delay);
        if bounded.is_zero() || self.jitter_fraction <= 0.0 {
            return bounded;
        }
        let lo = 1.0 - self.jitter_fraction;
        let hi = 1.0 + self.jitter_fraction;
        let factor = rand::thread_rng().gen_range(lo..=hi);
        Duration::from_millis((bounded.as_millis() as f64 * factor).round().max(0.0) as u64)
    }
}

/// Per-operation attempt tracker handed out by `RetryPolicy::handle`.
pub struct RetryHandle {
    policy: RetryPolicy,
    attempts: u32,
}

impl RetryHandle {
    /// Delay to sleep before the next attempt, or `None` once the attempt
    /// budget is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts + 1 >= self.policy.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.policy.delay_for_attempt(self.attempts))
    }

    /// Attempts consumed so far, excluding the initial try.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
