//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, one span per logical request)
//!     → metrics.rs (counters, gauges, histograms; MetricsSink events)
//!
//! Consumers:
//!     → stderr (pretty) or stdout (JSON)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Custom MetricsSink implementations
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - request_id, scope and fingerprint ride on the request span
//! - Metrics are cheap (atomic increments) and optional

pub mod logging;
pub mod metrics;

pub use self::metrics::{EventKind, FetchEvent, MetricsRecorderSink, MetricsSink, NoopSink};
