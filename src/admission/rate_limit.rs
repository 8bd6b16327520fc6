//! Token-bucket rate limiting per scope.
//!
//! # Responsibilities
//! - Keep one bucket per scope (or one global bucket)
//! - Suspend callers until a token is available, computed rather than polled
//! - Refuse early when the wait would outlive the caller's deadline
//!
//! # Design Decisions
//! - Refill-then-decrement happens under the bucket's own lock
//! - The map shard is released before the bucket lock is taken
//! - No request is ever dropped silently; it either waits or fails with a reason

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::observability::metrics;
use crate::request::FetchError;
use crate::resilience::timeouts::Deadline;

const GLOBAL_SCOPE: &str = "*";

/// Tolerance for float drift after sleeping exactly the computed deficit.
const EPSILON: f64 = 1e-9;

/// A single token bucket.
#[derive(Debug)]
pub struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket.
    pub fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Refill for the time elapsed, then take one token.
    ///
    /// On a shortfall returns how long until one token will be available,
    /// saturating at `Duration::MAX` for refill rates too slow to represent.
    pub fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> Result<(), Duration> {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_refill = now;

        if self.tokens + EPSILON >= 1.0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            Err(Duration::try_from_secs_f64(deficit / refill_rate).unwrap_or(Duration::MAX))
        }
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }
}

/// Admission control keyed by scope.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<String, Arc<Mutex<TokenBucket>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    fn bucket(&self, key: &str) -> Arc<Mutex<TokenBucket>> {
        if let Some(existing) = self.buckets.get(key) {
            return existing.clone();
        }
        let capacity = self.config.burst_size as f64;
        self.buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(capacity, Instant::now()))))
            .clone()
    }

    /// Wait for a token for `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::RateLimitTimeout`] as soon as it is known that no
    /// token can be had before `deadline`.
    pub async fn acquire(&self, scope: &str, deadline: &Deadline) -> Result<(), FetchError> {
        if !self.config.enabled {
            return Ok(());
        }

        let key = if self.config.per_scope { scope } else { GLOBAL_SCOPE };
        let bucket = self.bucket(key);
        let capacity = self.config.burst_size as f64;
        let rate = self.config.requests_per_second;
        let started = Instant::now();

        loop {
            let now = Instant::now();
            let wait = match bucket.lock().try_acquire(capacity, rate, now) {
                Ok(()) => {
                    let waited = now.duration_since(started);
                    if !waited.is_zero() {
                        metrics::record_rate_limit_wait(scope, waited);
                    }
                    return Ok(());
                }
                Err(wait) => wait,
            };

            let wake = match now.checked_add(wait) {
                Some(wake) if wake <= deadline.instant() => wake,
                _ => {
                    tracing::debug!(scope = %scope, wait = ?wait, "Rate limit wait exceeds deadline");
                    metrics::record_rate_limited(scope);
                    return Err(FetchError::RateLimitTimeout {
                        scope: scope.to_string(),
                    });
                }
            };

            tracing::trace!(scope = %scope, wait = ?wait, "Waiting for rate limit token");
            tokio::time::sleep_until(wake).await;
        }
    }

    /// Tokens currently in the bucket for `scope`, after refill accounting is
    /// applied on the next acquire.
    pub fn available(&self, scope: &str) -> Option<f64> {
        let key = if self.config.per_scope { scope } else { GLOBAL_SCOPE };
        let bucket = self.buckets.get(key)?.clone();
        let tokens = bucket.lock().tokens();
        Some(tokens)
    }
}
