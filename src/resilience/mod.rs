//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Executor for one logical request:
//!     → timeouts.rs (one deadline bounds every wait below)
//!     → circuit_breaker.rs (fail fast when the scope's circuit is open)
//!     → transport attempt
//!     → On transient failure: retries.rs (retry or give up) + backoff.rs (how long)
//!     → circuit_breaker.rs (record the final verdict once)
//! ```
//!
//! # Design Decisions
//! - Every logical request has a deadline; nothing waits unbounded
//! - Only transient failures are retried; client errors surface immediately
//! - The circuit sees one verdict per logical request, not per attempt

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{
    CircuitBreakerRegistry, CircuitMode, CircuitPermit, CircuitSnapshot, CircuitVerdict,
};
pub use retries::{RetryPolicy, RetryState, RetryStrategy};
pub use timeouts::Deadline;
