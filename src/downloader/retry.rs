//! Retry decisions for failed API calls
//!
//! Only quota (429) and transient server failures (500/503) are retried.
//! Delay is `base * 2^attempt`, scaled by a jitter factor drawn uniformly
//! from `[0.5, 1.0]` so that parallel clients do not retry in lockstep.

use rand::Rng;
use std::time::Duration;

use super::config::{INITIAL_BACKOFF_MS, MAX_RETRIES};
use crate::fetcher::FetcherError;

/// Lower bound of the jitter factor
pub const JITTER_MIN: f64 = 0.5;
/// Upper bound of the jitter factor
pub const JITTER_MAX: f64 = 1.0;

// 2^20 * base is already days; larger exponents only risk overflow.
const MAX_EXPONENT: u32 = 20;

/// Outcome of consulting the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given duration, then try again
    RetryAfter(Duration),
    /// Surface the error to the caller
    GiveUp,
}

/// Decides whether and when to retry a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(INITIAL_BACKOFF_MS), MAX_RETRIES)
    }
}

impl RetryPolicy {
    /// Create a policy
    ///
    /// # Arguments
    /// * `base_delay` - Delay before jitter for attempt 0
    /// * `max_retries` - Retries allowed after the initial attempt
    pub fn new(base_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_retries,
        }
    }

    /// Configured retry ceiling
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Configured base delay
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Decide what to do after `error` on the given zero-based `attempt`
    pub fn decide(&self, error: &FetcherError, attempt: u32) -> RetryDecision {
        if !error.is_retryable() || attempt >= self.max_retries {
            return RetryDecision::GiveUp;
        }
        let jitter = rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX);
        RetryDecision::RetryAfter(self.delay_with_jitter(attempt, jitter))
    }

    /// Un-jittered delay `base * 2^attempt` (the upper bound for that attempt)
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.pow(attempt.min(MAX_EXPONENT));
        self.base_delay.saturating_mul(factor)
    }

    /// Delay for `attempt` with an explicit jitter factor, clamped to `[0.5, 1.0]`
    ///
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn delay_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        let jitter = if jitter.is_nan() {
            JITTER_MAX
        } else {
            jitter.clamp(JITTER_MIN, JITTER_MAX)
        };
        let scaled = self.nominal_delay(attempt).as_secs_f64() * jitter;
        Duration::try_from_secs_f64(scaled).unwrap_or(Duration::MAX)
    }
}
