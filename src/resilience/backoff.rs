//! Backoff delays with bounded jitter.

use std::time::Duration;

use rand::Rng;

use crate::resilience::retries::{RetryPolicy, RetryStrategy};

/// Delay to wait before retry number `attempt` (1-based), without jitter.
///
/// Linear grows as `base * attempt`, exponential as `base * 2^(attempt-1)`.
/// The result is clamped to the policy's `max_delay`.
pub fn base_delay_for(attempt: u32, policy: &RetryPolicy) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base_ms = policy.base_delay.as_millis() as u64;
    let delay_ms = match policy.strategy {
        RetryStrategy::None => 0,
        RetryStrategy::Linear => base_ms.saturating_mul(attempt as u64),
        RetryStrategy::Exponential => {
            let exponential_base = 2u64.saturating_pow(attempt - 1);
            base_ms.saturating_mul(exponential_base)
        }
    };

    let delay = Duration::from_millis(delay_ms);
    match policy.max_delay {
        Some(max) => delay.min(max),
        None => delay,
    }
}

/// Delay before retry number `attempt`, with jitter applied.
///
/// A uniform fraction in `[0, jitter]` of the clamped delay is added, so the
/// result lies in `[d, d * (1 + jitter)]`.
pub fn delay_for(attempt: u32, policy: &RetryPolicy) -> Duration {
    let delay = base_delay_for(attempt, policy);
    if delay.is_zero() || !policy.jitter.is_finite() || policy.jitter <= 0.0 {
        return delay;
    }

    let fraction = rand::thread_rng().gen_range(0.0..=policy.jitter);
    delay + delay.mul_f64(fraction)
}
