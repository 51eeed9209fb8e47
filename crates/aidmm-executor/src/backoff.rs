//! Retry pacing for failed submissions.
//!
//! After `n` consecutive failures the next attempt waits
//! `base * 2^(n-1)`, capped at `max`. A success resets the count. With the
//! policy disabled every tick may retry.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Exponential backoff policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Delay after the first failure in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on the delay in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_enabled() -> bool {
    true
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    60_000
}

impl RetryPolicy {
    /// Retry on every tick, no backoff.
    #[must_use]
    pub fn fixed() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Delay before the next attempt after `failures` consecutive failures.
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        if !self.enabled || failures == 0 {
            return Duration::ZERO;
        }
        let exponent = failures.saturating_sub(1).min(20);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Failure count and earliest retry time for one submission path.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    failures: u32,
    retry_at: Option<Instant>,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            retry_at: None,
        }
    }

    /// Whether an attempt is allowed at `now`.
    #[must_use]
    pub fn ready(&self, now: Instant) -> bool {
        self.retry_at.map_or(true, |at| now >= at)
    }

    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failure and return the delay until the next attempt.
    pub fn record_failure(&mut self, now: Instant) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = self.policy.delay_for(self.failures);
        self.retry_at = Some(now + delay);
        delay
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        self.retry_at = None;
    }
}
