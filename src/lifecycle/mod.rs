//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → every in-flight request and dedup waiter resolves Cancelled
//!               → requests started afterwards fail Cancelled immediately
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → Shutdown::trigger
//!     second signal  → process exit
//! ```
//!
//! # Design Decisions
//! - Cancellation is cooperative: the engine races each wait against the flag
//! - The flag is latched; it is never reset on a live engine

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::spawn_signal_handler;
