//! Deadline enforcement.
//!
//! # Responsibilities
//! - Give every logical request one absolute deadline
//! - Bound any future (rate-limit wait, transport call, dedup wait) by it
//! - Report expiry as a distinct `Timeout` failure
//!
//! # Design Decisions
//! - Deadlines are absolute instants so nested waits share one budget
//! - Uses `tokio::time::Instant` so paused-clock tests drive expiry
//! - Expiry drops the wrapped future, which runs its guards' `Drop`

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::request::FetchError;

/// Absolute point in time a logical request must finish by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    /// Deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self::starting_at(Instant::now(), budget)
    }

    /// Deadline `budget` after `start`.
    pub fn starting_at(start: Instant, budget: Duration) -> Self {
        Self {
            at: start + budget,
            budget,
        }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Total budget the deadline was created with.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Time left; zero once expired.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Run `fut` until it completes or the deadline passes.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Timeout`] carrying the budget on expiry.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, FetchError>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout_at(self.at, fut)
            .await
            .map_err(|_| FetchError::Timeout(self.budget))
    }
}
