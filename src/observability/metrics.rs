//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define fetch engine metrics (attempts, latency, cache, circuits, rate limits)
//! - Expose a Prometheus-compatible metrics endpoint
//! - Hand per-attempt events to a pluggable [`MetricsSink`]
//!
//! # Metrics
//! - `fetch_attempts_total` (counter): transport attempts by scope, result
//! - `fetch_attempt_duration_seconds` (histogram): attempt latency by scope
//! - `fetch_events_total` (counter): cache hits, coalesced and rejected requests
//! - `fetch_cache_lookups_total` (counter): lookups by result (hit, miss)
//! - `fetch_cache_evictions_total` (counter): removals by reason (capacity, expired)
//! - `fetch_cache_entries` (gauge): stored entries
//! - `fetch_circuit_transitions_total` (counter): transitions by scope, target state
//! - `fetch_rate_limited_total` (counter): rate-limit rejections by scope
//! - `fetch_rate_limit_wait_seconds` (histogram): time spent waiting for tokens
//! - `fetch_batch_requests_total` (counter): batch members by result
//! - `fetch_batch_duration_seconds` (histogram): batch wall time
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The engine never blocks on a sink; sinks must return promptly

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe_metrics();
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter");
        }
    }
}

fn describe_metrics() {
    metrics::describe_counter!("fetch_attempts_total", "Transport attempts by scope and result.");
    metrics::describe_histogram!(
        "fetch_attempt_duration_seconds",
        metrics::Unit::Seconds,
        "Duration of transport attempts in seconds."
    );
    metrics::describe_counter!(
        "fetch_events_total",
        "Requests answered without a transport attempt, by kind."
    );
    metrics::describe_counter!("fetch_cache_lookups_total", "Cache lookups by result.");
    metrics::describe_counter!("fetch_cache_evictions_total", "Cache removals by reason.");
    metrics::describe_gauge!("fetch_cache_entries", "Entries currently cached.");
    metrics::describe_counter!(
        "fetch_circuit_transitions_total",
        "Circuit breaker transitions by scope and target state."
    );
    metrics::describe_counter!("fetch_rate_limited_total", "Rate-limit rejections by scope.");
    metrics::describe_histogram!(
        "fetch_rate_limit_wait_seconds",
        metrics::Unit::Seconds,
        "Time spent waiting for a rate-limit token."
    );
    metrics::describe_counter!("fetch_batch_requests_total", "Batch members by result.");
    metrics::describe_histogram!(
        "fetch_batch_duration_seconds",
        metrics::Unit::Seconds,
        "Wall time of fetch_many batches."
    );
}

/// Kind of engine event handed to a [`MetricsSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// One transport call.
    Attempt,
    /// Answered from the cache.
    CacheHit,
    /// Answered by an identical in-flight request.
    Coalesced,
    /// Refused before any transport call (circuit open, rate limit, shutdown).
    Rejected,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attempt => "attempt",
            Self::CacheHit => "cache_hit",
            Self::Coalesced => "coalesced",
            Self::Rejected => "rejected",
        }
    }
}

/// One observation from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchEvent {
    pub scope: String,
    pub kind: EventKind,
    pub duration: Duration,
    pub success: bool,
}

/// Receives engine events.
pub trait MetricsSink: Send + Sync {
    fn record(&self, event: FetchEvent);
}

/// Forwards events to the `metrics` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorderSink;

impl MetricsSink for MetricsRecorderSink {
    fn record(&self, event: FetchEvent) {
        let result = if event.success { "success" } else { "failure" };
        match event.kind {
            EventKind::Attempt => {
                metrics::counter!(
                    "fetch_attempts_total",
                    "scope" => event.scope.clone(),
                    "result" => result
                )
                .increment(1);
                metrics::histogram!("fetch_attempt_duration_seconds", "scope" => event.scope)
                    .record(event.duration.as_secs_f64());
            }
            kind => {
                metrics::counter!(
                    "fetch_events_total",
                    "scope" => event.scope,
                    "kind" => kind.as_str(),
                    "result" => result
                )
                .increment(1);
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn record(&self, _event: FetchEvent) {}
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::counter!("fetch_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_eviction(reason: &'static str) {
    metrics::counter!("fetch_cache_evictions_total", "reason" => reason).increment(1);
}

pub fn record_cache_size(entries: usize) {
    metrics::gauge!("fetch_cache_entries").set(entries as f64);
}

pub fn record_circuit_transition(scope: &str, to: &'static str) {
    metrics::counter!(
        "fetch_circuit_transitions_total",
        "scope" => scope.to_string(),
        "to" => to
    )
    .increment(1);
}

pub fn record_rate_limited(scope: &str) {
    metrics::counter!("fetch_rate_limited_total", "scope" => scope.to_string()).increment(1);
}

pub fn record_rate_limit_wait(scope: &str, waited: Duration) {
    metrics::histogram!("fetch_rate_limit_wait_seconds", "scope" => scope.to_string())
        .record(waited.as_secs_f64());
}

pub fn record_batch(successes: usize, failures: usize, elapsed: Duration) {
    metrics::counter!("fetch_batch_requests_total", "result" => "success").increment(successes as u64);
    metrics::counter!("fetch_batch_requests_total", "result" => "failure").increment(failures as u64);
    metrics::histogram!("fetch_batch_duration_seconds").record(elapsed.as_secs_f64());
}
