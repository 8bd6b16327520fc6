//! Request fingerprinting.
//!
//! A fingerprint identifies logically identical requests. It covers the
//! method, the target, the body and every header except a small set of
//! per-request volatile ones. Header names are already lowercase in a
//! `HeaderMap`, and pairs are sorted before hashing so insertion order does
//! not matter.

use std::fmt;

use http::{HeaderMap, Method};
use sha2::{Digest, Sha256};

/// Headers that differ per request without changing what is being asked for.
const VOLATILE_HEADERS: &[&str] = &["user-agent", "date", "x-request-id", "traceparent", "tracestate"];

/// Stable SHA-256 key for cache and dedup lookups.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Compute the fingerprint of a request.
    pub fn compute(method: &Method, target: &str, headers: &HeaderMap, body: Option<&[u8]>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(method.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(target.as_bytes());
        hasher.update([0u8]);

        let mut relevant: Vec<(&str, &[u8])> = headers
            .iter()
            .filter(|(name, _)| !VOLATILE_HEADERS.contains(&name.as_str()))
            .map(|(name, value)| (name.as_str(), value.as_bytes()))
            .collect();
        relevant.sort_unstable();

        for (name, value) in relevant {
            hasher.update(name.as_bytes());
            hasher.update(b":");
            hasher.update(value);
            hasher.update(b"\n");
        }

        match body {
            Some(body) => {
                hasher.update([1u8]);
                hasher.update(body);
            }
            None => hasher.update([0u8]),
        }

        Self(hasher.finalize().into())
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First twelve hex characters, for logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}
