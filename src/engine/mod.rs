//! Fetch engine.
//!
//! # Data Flow
//! ```text
//! fetch_one(descriptor)
//!     → shutdown tripped?            → Cancelled
//!     → cache hit?                   → outcome (source = Cache)
//!     → dedup claim
//!         → Waiter                   → executor's outcome (source = Coalesced)
//!         → Executor
//!             → rate limiter         → RateLimitTimeout
//!             → circuit breaker      → CircuitOpen
//!             → attempt loop (transport gate → transport → retry/backoff)
//!             → circuit verdict, cache store, resolve waiters
//!
//! fetch_many(descriptors, limit)
//!     → batch gate (FIFO) → fetch_one per descriptor on its own task
//!     → outcomes in input order + BatchReport
//! ```
//!
//! # Design Decisions
//! - All engine state is owned by the instance; engines never share state
//! - Every failure is an outcome, never a panic or an `Err` from fetch

pub mod batch;
pub mod orchestrator;

pub use batch::BatchReport;
pub use orchestrator::{EngineBuilder, EngineError, FetchEngine};
