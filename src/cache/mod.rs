//! Response cache.
//!
//! # Data Flow
//! ```text
//! fetch_one(descriptor)
//!     → cacheable? (GET/HEAD, policy not Bypass)
//!     → ResponseCache::get(fingerprint) → hit: outcome with source = Cache
//!     → miss: dedup + network
//!     → 2xx and cacheable: ResponseCache::put(fingerprint, response, ttl)
//! ```
//!
//! # Design Decisions
//! - Only successes are stored; failures always go back to the network
//! - Capacity is counted in entries or in approximate response bytes
//! - Writes to a target never invalidate cached reads of it

pub mod store;

use std::sync::Arc;

use crate::config::{CacheConfig, SizeBy};
use crate::request::Fingerprint;
use crate::transport::RawResponse;

pub use store::{CacheStats, TtlCache, Weigher};

/// Cache of raw responses keyed by request fingerprint.
pub type ResponseCache = TtlCache<Fingerprint, RawResponse>;

/// Approximate in-memory size of a response.
pub fn response_weight(response: &RawResponse) -> usize {
    let headers: usize = response
        .headers
        .iter()
        .map(|(name, value)| name.as_str().len() + value.len())
        .sum();
    response.body.len() + headers
}

/// Build the response cache described by `config`.
pub fn response_cache(config: &CacheConfig) -> ResponseCache {
    match config.size_by {
        SizeBy::Entries => TtlCache::new(config.capacity),
        SizeBy::Bytes => TtlCache::with_weigher(config.capacity, Arc::new(response_weight)),
    }
}
