//! Request and outcome types.
//!
//! # Data Flow
//! ```text
//! caller
//!     → DescriptorBuilder (method, target, headers, body, overrides)
//!     → RequestDescriptor (immutable, fingerprint computed once)
//!     → engine pipeline
//!     → FetchOutcome (success or FetchError, attempts, elapsed, source)
//! ```
//!
//! # Design Decisions
//! - Descriptors are frozen at build time; the engine only ever borrows them
//! - The fingerprint is the single key for both cache and dedup
//! - Outcomes are cheap to clone so every dedup waiter gets its own copy

pub mod descriptor;
pub mod fingerprint;
pub mod outcome;

pub use descriptor::{CachePolicy, DescriptorBuilder, DescriptorError, RequestDescriptor};
pub use fingerprint::Fingerprint;
pub use outcome::{ErrorKind, FetchError, FetchOutcome, OutcomeSource};
