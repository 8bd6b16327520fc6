//! Admission control.
//!
//! # Data Flow
//! ```text
//! Executor for a logical request:
//!     → rate_limit.rs (one token per logical request, per scope)
//!     → circuit breaker (resilience)
//!     → concurrency.rs (one engine-wide permit per transport attempt)
//!     → transport
//! ```
//!
//! # Design Decisions
//! - Rate limiting gates request start; it never drops work silently
//! - Concurrency gates bound transport calls, not logical requests

pub mod concurrency;
pub mod rate_limit;

pub use concurrency::ConcurrencyGate;
pub use rate_limit::{RateLimiter, TokenBucket};
