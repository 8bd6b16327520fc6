//! Retry decisions.
//!
//! # Responsibilities
//! - Decide whether a failed attempt is retried
//! - Track cumulative backoff against the optional total-delay cap
//!
//! # Design Decisions
//! - Only transient failures are retried (connect, timeout, I/O, 5xx, 408, 429)
//! - `max_attempts` counts every transport call, the first one included
//! - A retry whose delay would overrun the total cap is not taken at all

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::RetryConfig;
use crate::resilience::backoff;
use crate::transport::TransportError;

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Never retry.
    None,
    Linear,
    #[default]
    Exponential,
}

/// Retry behaviour for a request.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub strategy: RetryStrategy,
    /// Total transport calls allowed, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Clamp applied to each single delay before jitter.
    pub max_delay: Option<Duration>,
    /// Upper bound of the random fraction added to each delay (0.0 - 1.0).
    pub jitter: f64,
    /// Cap on the sum of all backoff delays for one request.
    pub max_total_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::Exponential,
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Some(Duration::from_secs(2)),
            jitter: 0.1,
            max_total_delay: None,
        }
    }
}

fn clamp_jitter(jitter: f64) -> f64 {
    if jitter.is_nan() {
        0.0
    } else {
        jitter.clamp(0.0, 1.0)
    }
}

impl RetryPolicy {
    /// A single attempt, never retried.
    pub fn none() -> Self {
        Self {
            strategy: RetryStrategy::None,
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: None,
            jitter: 0.0,
            max_total_delay: None,
        }
    }

    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            strategy: RetryStrategy::Linear,
            max_attempts,
            base_delay,
            max_delay: None,
            jitter: 0.0,
            max_total_delay: None,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            strategy: RetryStrategy::Exponential,
            max_attempts,
            base_delay,
            max_delay: None,
            jitter: 0.0,
            max_total_delay: None,
        }
    }

    /// Jitter fraction, clamped to `0.0..=1.0`; NaN becomes 0.0.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = clamp_jitter(jitter);
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn with_max_total_delay(mut self, cap: Duration) -> Self {
        self.max_total_delay = Some(cap);
        self
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            strategy: config.strategy,
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Some(Duration::from_millis(config.max_delay_ms)),
            jitter: clamp_jitter(config.jitter),
            max_total_delay: config.max_total_delay_ms.map(Duration::from_millis),
        }
    }
}

/// Whether attempt number `attempt` (1-based) may be followed by another.
pub fn should_retry(attempt: u32, error: &TransportError, policy: &RetryPolicy) -> bool {
    policy.strategy != RetryStrategy::None && error.is_transient() && attempt < policy.max_attempts
}

/// Per-request retry bookkeeping.
#[derive(Debug)]
pub struct RetryState<'a> {
    policy: &'a RetryPolicy,
    total_delay: Duration,
}

impl<'a> RetryState<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self {
            policy,
            total_delay: Duration::ZERO,
        }
    }

    /// Delay to sleep after failed attempt `attempt`, or `None` to stop.
    pub fn next_delay(&mut self, attempt: u32, error: &TransportError) -> Option<Duration> {
        if !should_retry(attempt, error, self.policy) {
            return None;
        }

        let delay = backoff::delay_for(attempt, self.policy);
        if let Some(cap) = self.policy.max_total_delay {
            if self.total_delay + delay > cap {
                tracing::debug!(
                    attempt,
                    spent = ?self.total_delay,
                    cap = ?cap,
                    "Retry delay budget exhausted"
                );
                return None;
            }
        }

        self.total_delay += delay;
        Some(delay)
    }

    /// Sum of delays handed out so far.
    pub fn total_delay(&self) -> Duration {
        self.total_delay
    }
}
