//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, rates > 0, fractions within 0..=1)
//! - Check cross-field constraints (connect timeout within the total deadline)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Disabled subsystems are not checked

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::EngineConfig;

/// One semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check a parsed configuration.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let t = &config.timeouts;
    if t.total_ms == 0 {
        errors.push(ValidationError::new("timeouts.total_ms", "must be greater than 0"));
    }
    if t.connect_ms == 0 {
        errors.push(ValidationError::new("timeouts.connect_ms", "must be greater than 0"));
    }
    if t.read_ms == 0 {
        errors.push(ValidationError::new("timeouts.read_ms", "must be greater than 0"));
    }
    if t.connect_ms > t.total_ms {
        errors.push(ValidationError::new(
            "timeouts.connect_ms",
            format!("must not exceed timeouts.total_ms ({})", t.total_ms),
        ));
    }

    if config.concurrency.max_concurrent_requests == 0 {
        errors.push(ValidationError::new(
            "concurrency.max_concurrent_requests",
            "must be at least 1",
        ));
    }

    let r = &config.retries;
    if r.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }
    if !(0.0..=1.0).contains(&r.jitter) {
        errors.push(ValidationError::new("retries.jitter", "must be between 0.0 and 1.0"));
    }
    if r.max_delay_ms < r.base_delay_ms {
        errors.push(ValidationError::new(
            "retries.max_delay_ms",
            "must not be below retries.base_delay_ms",
        ));
    }

    let rl = &config.rate_limit;
    if rl.enabled {
        if !(rl.requests_per_second > 0.0 && rl.requests_per_second.is_finite()) {
            errors.push(ValidationError::new(
                "rate_limit.requests_per_second",
                "must be a positive number",
            ));
        }
        if rl.burst_size == 0 {
            errors.push(ValidationError::new("rate_limit.burst_size", "must be at least 1"));
        }
    }

    if config.cache.enabled && config.cache.capacity == 0 {
        errors.push(ValidationError::new("cache.capacity", "must be at least 1"));
    }

    let cb = &config.circuit_breaker;
    if cb.enabled {
        if cb.failure_threshold == 0 {
            errors.push(ValidationError::new(
                "circuit_breaker.failure_threshold",
                "must be at least 1",
            ));
        }
        if cb.half_open_trials == 0 {
            errors.push(ValidationError::new(
                "circuit_breaker.half_open_trials",
                "must be at least 1",
            ));
        }
    }

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", obs.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
