//! Resilient concurrent fetch engine.
//!
//! Sits between application code and a transport, turning "make this request"
//! into an operation with bounded concurrency, retries, failure isolation,
//! rate control, response caching and duplicate suppression.
//!
//! # Architecture Overview
//!
//! ```text
//!   caller ──▶ FetchEngine::fetch_one / fetch_many
//!                 │
//!                 ├─▶ cache        (TTL + LRU, keyed by fingerprint)
//!                 ├─▶ dedup        (one executor per fingerprint, waiters share)
//!                 ├─▶ admission    (token bucket per scope, transport gate)
//!                 ├─▶ resilience   (deadline, circuit breaker, retry/backoff)
//!                 └─▶ transport    (Transport trait; reqwest HttpTransport)
//!
//!   cross-cutting: config (TOML), observability (tracing, metrics),
//!                  lifecycle (shutdown, signals)
//! ```

// Core subsystems
pub mod engine;
pub mod request;
pub mod transport;

// Request shaping
pub mod admission;
pub mod cache;
pub mod dedup;
pub mod resilience;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::EngineConfig;
pub use engine::{BatchReport, EngineBuilder, EngineError, FetchEngine};
pub use lifecycle::Shutdown;
pub use request::{
    CachePolicy, ErrorKind, FetchError, FetchOutcome, Fingerprint, OutcomeSource,
    RequestDescriptor,
};
pub use resilience::{CircuitMode, RetryPolicy, RetryStrategy};
pub use transport::{HttpTransport, RawResponse, Transport, TransportError};
