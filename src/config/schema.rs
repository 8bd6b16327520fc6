//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits for deserialization from config files, and
//! every field has a default so an empty file is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::retries::RetryStrategy;

/// Root configuration for the fetch engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Request deadlines.
    pub timeouts: TimeoutConfig,

    /// Concurrency bounds.
    pub concurrency: ConcurrencyConfig,

    /// Retry policy applied when a request carries none.
    pub retries: RetryConfig,

    /// Token-bucket admission control.
    pub rate_limit: RateLimitConfig,

    /// Response cache.
    pub cache: CacheConfig,

    /// Per-scope circuit breakers.
    pub circuit_breaker: CircuitBreakerConfig,

    /// HTTP transport settings.
    pub transport: TransportConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default deadline for a whole logical request (all attempts) in milliseconds.
    pub total_ms: u64,

    /// Connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Read timeout between response chunks in milliseconds.
    pub read_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            total_ms: 30_000,
            connect_ms: 5_000,
            read_ms: 30_000,
        }
    }
}

impl TimeoutConfig {
    pub fn total(&self) -> Duration {
        Duration::from_millis(self.total_ms)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn read(&self) -> Duration {
        Duration::from_millis(self.read_ms)
    }
}

/// Concurrency configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Engine-wide cap on outstanding transport calls.
    pub max_concurrent_requests: usize,

    /// Default `fetch_many` limit used by the CLI.
    pub batch_limit: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 64,
            batch_limit: 8,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay growth: none, linear or exponential.
    pub strategy: RetryStrategy,

    /// Total attempts per request, the first included.
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds.
    pub base_delay_ms: u64,

    /// Cap on a single backoff delay in milliseconds.
    pub max_delay_ms: u64,

    /// Random fraction (0.0 - 1.0) of each delay added as jitter.
    pub jitter: f64,

    /// Cap on the sum of backoff delays for one request, in milliseconds.
    pub max_total_delay_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::Exponential,
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
            jitter: 0.1,
            max_total_delay_ms: None,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Sustained requests per second per scope.
    pub requests_per_second: f64,

    /// Burst capacity.
    pub burst_size: u32,

    /// One bucket per scope (true) or one shared bucket (false).
    pub per_scope: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: 10.0,
            burst_size: 10,
            per_scope: true,
        }
    }
}

/// How cache capacity is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeBy {
    #[default]
    Entries,
    /// Approximate response size (body plus headers).
    Bytes,
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the response cache.
    pub enabled: bool,

    /// Capacity, in entries or bytes depending on `size_by`.
    pub capacity: usize,

    /// TTL for cached responses in seconds.
    pub default_ttl_secs: u64,

    pub size_by: SizeBy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1024,
            default_ttl_secs: 300,
            size_by: SizeBy::Entries,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Enable circuit breakers.
    pub enabled: bool,

    /// Consecutive failures that open a circuit.
    pub failure_threshold: u32,

    /// Time an open circuit waits before allowing trials, in milliseconds.
    pub cooldown_ms: u64,

    /// Concurrent trial requests allowed while half-open.
    pub half_open_trials: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            cooldown_ms: 30_000,
            half_open_trials: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// User-Agent sent with every request.
    pub user_agent: String,

    /// Follow redirects.
    pub follow_redirects: bool,

    /// Maximum redirects followed per request.
    pub max_redirects: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("resilient-fetch/", env!("CARGO_PKG_VERSION")).to_string(),
            follow_redirects: true,
            max_redirects: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
