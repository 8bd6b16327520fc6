//! Duplicate request suppression.
//!
//! # Data Flow
//! ```text
//! fetch_one(descriptor) after a cache miss
//!     → Deduplicator::claim(fingerprint)
//!         → Executor: run the pipeline, ExecutorGuard::resolve(outcome)
//!         → Waiter:   Waiter::wait() → the executor's outcome (source = Coalesced)
//! ```
//!
//! # Design Decisions
//! - At most one in-flight entry per fingerprint
//! - An executor that is cancelled or times out still unregisters; its
//!   waiters see the abandonment instead of hanging
//! - Waiters honour their own deadlines independently of the executor

pub mod registry;

use crate::request::{FetchOutcome, Fingerprint};

pub use registry::{Abandoned, Claim, Deduplicator, ExecutorGuard, Waiter};

/// Registry of in-flight logical requests keyed by fingerprint.
pub type RequestDeduplicator = Deduplicator<Fingerprint, FetchOutcome>;
