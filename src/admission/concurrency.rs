//! Counting gate for outstanding transport calls.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, SemaphorePermit};

use crate::request::FetchError;

/// Bounds how many holders may be inside at once.
///
/// Waiters are admitted in arrival order (Tokio's semaphore is fair).
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl ConcurrencyGate {
    /// A gate admitting `limit` holders; a limit of 0 is treated as 1.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, FetchError> {
        self.semaphore.acquire().await.map_err(|_| FetchError::Cancelled)
    }

    /// A permit that can move into a spawned task.
    pub async fn acquire_owned(&self) -> Result<OwnedSemaphorePermit, FetchError> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| FetchError::Cancelled)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.limit.saturating_sub(self.available())
    }
}
