//! TTL + LRU store.
//!
//! # Responsibilities
//! - Serve values until `stored_at + ttl`, then treat them as absent
//! - Keep total weight within capacity, evicting before inserting
//! - Track hits, misses, evictions and expirations
//!
//! # Design Decisions
//! - DashMap shards the key space; distinct keys never serialize
//! - Weight is reserved with a CAS loop on one atomic counter, so the bound
//!   holds while many tasks insert at once
//! - Recency is a logical tick, not a timestamp; eviction scans for the
//!   smallest tick and prefers entries that have already expired

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::observability::metrics;

/// Computes the weight a value counts for against capacity.
pub type Weigher<V> = Arc<dyn Fn(&V) -> usize + Send + Sync>;

struct CacheEntry<V> {
    value: V,
    weight: usize,
    stored_at: Instant,
    ttl: Duration,
    last_access: AtomicU64,
    access_count: AtomicU64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.stored_at + self.ttl
    }
}

/// Counters describing cache behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub weight: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

/// Concurrent cache with per-entry TTL and least-recently-used eviction.
pub struct TtlCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    capacity: usize,
    size: AtomicUsize,
    tick: AtomicU64,
    weigher: Weigher<V>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<K, V> fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("capacity", &self.capacity)
            .field("size", &self.size.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// A cache bounded by entry count.
    pub fn new(capacity: usize) -> Self {
        Self::with_weigher(capacity, Arc::new(|_: &V| 1))
    }

    /// A cache bounded by the summed weight of its values.
    pub fn with_weigher(capacity: usize, weigher: Weigher<V>) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            size: AtomicUsize::new(0),
            tick: AtomicU64::new(0),
            weigher,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    /// Look up a live value, refreshing its recency.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();

        match self.entries.get(key) {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_lookup(false);
                return None;
            }
            Some(entry) if !entry.is_expired(now) => {
                entry.last_access.store(self.next_tick(), Ordering::Relaxed);
                entry.access_count.fetch_add(1, Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_lookup(true);
                return Some(entry.value.clone());
            }
            Some(_) => {}
        }

        // Expired: purge lazily, unless someone already replaced it
        if let Some((_, stale)) = self.entries.remove_if(key, |_, e| e.is_expired(now)) {
            self.size.fetch_sub(stale.weight, Ordering::AcqRel);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_eviction("expired");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_lookup(false);
        None
    }

    /// Store `value` under `key` for `ttl`, replacing any previous value.
    ///
    /// Returns `false` when the value was not stored: zero TTL, heavier than
    /// the whole cache, or no room could be made.
    pub fn put(&self, key: K, value: V, ttl: Duration) -> bool {
        if ttl.is_zero() {
            return false;
        }
        let weight = (self.weigher)(&value).max(1);
        if weight > self.capacity {
            tracing::debug!(weight, capacity = self.capacity, "Value too large to cache");
            return false;
        }

        if let Some((_, old)) = self.entries.remove(&key) {
            self.size.fetch_sub(old.weight, Ordering::AcqRel);
        }

        if !self.reserve(weight) {
            return false;
        }

        let entry = CacheEntry {
            value,
            weight,
            stored_at: Instant::now(),
            ttl,
            last_access: AtomicU64::new(self.next_tick()),
            access_count: AtomicU64::new(0),
        };
        if let Some(raced) = self.entries.insert(key, entry) {
            self.size.fetch_sub(raced.weight, Ordering::AcqRel);
        }

        metrics::record_cache_size(self.entries.len());
        true
    }

    fn reserve(&self, weight: usize) -> bool {
        let mut current = self.size.load(Ordering::Acquire);
        loop {
            if current + weight <= self.capacity {
                match self.size.compare_exchange_weak(
                    current,
                    current + weight,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return true,
                    Err(actual) => current = actual,
                }
            } else {
                if !self.evict_one() {
                    return false;
                }
                current = self.size.load(Ordering::Acquire);
            }
        }
    }

    /// Remove one victim: an expired entry if any, else the least recently used.
    fn evict_one(&self) -> bool {
        let now = Instant::now();
        let mut victim: Option<(K, bool, u64)> = None;

        for entry in self.entries.iter() {
            let expired = entry.is_expired(now);
            let tick = entry.last_access.load(Ordering::Relaxed);
            let better = match &victim {
                None => true,
                Some((_, v_expired, v_tick)) => {
                    (expired && !v_expired) || (expired == *v_expired && tick < *v_tick)
                }
            };
            if better {
                victim = Some((entry.key().clone(), expired, tick));
            }
        }

        let Some((key, expired, _)) = victim else {
            return false;
        };
        if let Some((_, removed)) = self.entries.remove(&key) {
            self.size.fetch_sub(removed.weight, Ordering::AcqRel);
            if expired {
                self.expirations.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_eviction("expired");
            } else {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_eviction("capacity");
            }
        }
        true
    }

    /// Drop the entry for `key`. Returns whether one was present.
    pub fn invalidate(&self, key: &K) -> bool {
        match self.entries.remove(key) {
            Some((_, removed)) => {
                self.size.fetch_sub(removed.weight, Ordering::AcqRel);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.entries.retain(|_, entry| {
            self.size.fetch_sub(entry.weight, Ordering::AcqRel);
            false
        });
        metrics::record_cache_size(0);
    }

    /// Stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Weight currently accounted against capacity.
    pub fn weight(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// How often the entry for `key` has been read.
    pub fn access_count(&self, key: &K) -> Option<u64> {
        self.entries
            .get(key)
            .map(|entry| entry.access_count.load(Ordering::Relaxed))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            weight: self.weight(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}
