//! In-flight request registry.
//!
//! # Responsibilities
//! - Hand exactly one caller per key the executor role
//! - Let every other caller wait on the executor's result
//! - Remove the entry on every exit path of the executor
//!
//! # Design Decisions
//! - Each entry is a `watch` channel: resolved once, read by any number of waiters
//! - Waiters subscribe while holding the entry's shard lock, so none can miss
//!   a resolution that removes the entry
//! - Entries carry a generation; a guard only ever removes its own entry

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::watch;

/// The executor finished without publishing a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("in-flight request was abandoned before it resolved")]
pub struct Abandoned;

struct PendingEntry<V> {
    generation: u64,
    sender: watch::Sender<Option<V>>,
}

/// Merges concurrent work for the same key.
pub struct Deduplicator<K, V> {
    pending: Arc<DashMap<K, PendingEntry<V>>>,
    generation: AtomicU64,
}

impl<K: Eq + Hash, V> std::fmt::Debug for Deduplicator<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deduplicator")
            .field("in_flight", &self.pending.len())
            .finish()
    }
}

/// Role handed out by [`Deduplicator::claim`].
pub enum Claim<K: Eq + Hash, V> {
    /// Do the work, then call [`ExecutorGuard::resolve`].
    Executor(ExecutorGuard<K, V>),
    /// Someone else is doing the work; wait for it.
    Waiter(Waiter<V>),
}

impl<K, V> Default for Deduplicator<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Deduplicator<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Register interest in `key`.
    pub fn claim(&self, key: K) -> Claim<K, V> {
        match self.pending.entry(key.clone()) {
            Entry::Occupied(entry) => Claim::Waiter(Waiter {
                rx: entry.get().sender.subscribe(),
            }),
            Entry::Vacant(entry) => {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                let (sender, _) = watch::channel(None);
                entry.insert(PendingEntry { generation, sender });
                Claim::Executor(ExecutorGuard {
                    pending: self.pending.clone(),
                    key,
                    generation,
                    resolved: false,
                })
            }
        }
    }

    /// Keys currently being executed.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }
}

/// Held by the single executor for a key.
///
/// Dropping it without resolving unregisters the key and wakes every waiter
/// with [`Abandoned`].
pub struct ExecutorGuard<K: Eq + Hash, V> {
    pending: Arc<DashMap<K, PendingEntry<V>>>,
    key: K,
    generation: u64,
    resolved: bool,
}

impl<K: Eq + Hash, V> ExecutorGuard<K, V> {
    fn unregister(&self) -> Option<PendingEntry<V>> {
        let generation = self.generation;
        self.pending
            .remove_if(&self.key, |_, entry| entry.generation == generation)
            .map(|(_, entry)| entry)
    }

    /// Publish `value` to every waiter and unregister the key.
    pub fn resolve(mut self, value: V) {
        self.resolved = true;
        if let Some(entry) = self.unregister() {
            entry.sender.send_replace(Some(value));
        }
    }
}

impl<K: Eq + Hash, V> Drop for ExecutorGuard<K, V> {
    fn drop(&mut self) {
        if !self.resolved {
            // Dropping the sender closes the channel for waiters
            drop(self.unregister());
        }
    }
}

/// Waits for another caller's result.
pub struct Waiter<V> {
    rx: watch::Receiver<Option<V>>,
}

impl<V: Clone> Waiter<V> {
    /// Wait for the executor to resolve.
    ///
    /// # Errors
    ///
    /// Returns [`Abandoned`] if the executor was dropped without a result.
    pub async fn wait(mut self) -> Result<V, Abandoned> {
        let result = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map(|value| (*value).clone());

        match result {
            Ok(Some(value)) => Ok(value),
            _ => Err(Abandoned),
        }
    }
}
