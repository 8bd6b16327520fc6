//! Terminal results of logical requests.

use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::request::fingerprint::Fingerprint;
use crate::transport::{RawResponse, TransportError};

/// Coarse classification of a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CircuitOpen,
    RateLimitTimeout,
    RetriesExhausted,
    Timeout,
    Cancelled,
    /// A non-transient transport failure, surfaced without retry.
    Transport,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CircuitOpen => "circuit_open",
            Self::RateLimitTimeout => "rate_limit_timeout",
            Self::RetriesExhausted => "retries_exhausted",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Transport => "transport",
        }
    }
}

/// Why a logical request failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The scope's circuit is open; no attempt was made.
    #[error("circuit open for {scope}")]
    CircuitOpen { scope: String },

    /// No rate-limit token could be obtained before the deadline.
    #[error("rate limit wait for {scope} would exceed the deadline")]
    RateLimitTimeout { scope: String },

    /// Every allowed attempt failed transiently.
    #[error("gave up after {attempts} attempt(s): {last}")]
    RetriesExhausted { attempts: u32, last: TransportError },

    /// The request deadline expired.
    #[error("deadline of {0:?} exceeded")]
    Timeout(Duration),

    /// The engine shut down, or the executing task went away.
    #[error("request cancelled")]
    Cancelled,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::RateLimitTimeout { .. } => ErrorKind::RateLimitTimeout,
            Self::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Transport(_) => ErrorKind::Transport,
        }
    }

    /// Status code of the underlying upstream answer, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RetriesExhausted { last, .. } => last.status(),
            Self::Transport(err) => err.status(),
            _ => None,
        }
    }
}

/// How a successful outcome was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeSource {
    /// This caller's own transport call.
    Network,
    /// Served from the response cache.
    Cache,
    /// Shared from an identical in-flight request.
    Coalesced,
}

/// Result of one logical request, after every retry.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub(crate) scope: String,
    pub(crate) fingerprint: Fingerprint,
    pub(crate) status: Option<u16>,
    pub(crate) headers: HeaderMap,
    pub(crate) payload: Option<Bytes>,
    pub(crate) elapsed: Duration,
    pub(crate) attempts: u32,
    pub(crate) error: Option<FetchError>,
    pub(crate) source: OutcomeSource,
}

impl FetchOutcome {
    pub(crate) fn from_response(
        scope: &str,
        fingerprint: Fingerprint,
        response: RawResponse,
        attempts: u32,
        elapsed: Duration,
        source: OutcomeSource,
    ) -> Self {
        Self {
            scope: scope.to_string(),
            fingerprint,
            status: Some(response.status),
            headers: response.headers,
            payload: Some(response.body),
            elapsed,
            attempts,
            error: None,
            source,
        }
    }

    pub(crate) fn failure(
        scope: &str,
        fingerprint: Fingerprint,
        error: FetchError,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            scope: scope.to_string(),
            fingerprint,
            status: error.status(),
            headers: HeaderMap::new(),
            payload: None,
            elapsed,
            attempts,
            error: Some(error),
            source: OutcomeSource::Network,
        }
    }

    /// Copy handed to a dedup waiter: same result, the waiter's own timing.
    pub(crate) fn coalesced(&self, elapsed: Duration) -> Self {
        let mut shared = self.clone();
        shared.elapsed = elapsed;
        if shared.error.is_none() {
            shared.source = OutcomeSource::Coalesced;
        }
        shared
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Upstream status. Present on success and on failures that got an answer.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw payload; `None` on failure.
    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Transport calls made; 0 for cache hits and fast-failed requests.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.error.as_ref()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(FetchError::kind)
    }

    pub fn source(&self) -> OutcomeSource {
        self.source
    }

    /// Payload as UTF-8, lossily decoded.
    pub fn text(&self) -> Option<String> {
        self.payload
            .as_ref()
            .map(|body| String::from_utf8_lossy(body).into_owned())
    }

    /// Decode the payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.payload.as_ref().map(|body| serde_json::from_slice(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn fp() -> Fingerprint {
        Fingerprint::compute(&Method::GET, "https://a.example/", &HeaderMap::new(), None)
    }

    #[test]
    fn test_success_outcome_accessors() {
        let outcome = FetchOutcome::from_response(
            "a.example",
            fp(),
            RawResponse::new(200, r#"{"id":7}"#),
            2,
            Duration::from_millis(30),
            OutcomeSource::Network,
        );

        assert!(outcome.is_success());
        assert_eq!(outcome.status(), Some(200));
        assert_eq!(outcome.attempts(), 2);
        assert_eq!(outcome.text().as_deref(), Some(r#"{"id":7}"#));

        let value: serde_json::Value = outcome.json().unwrap().unwrap();
        assert_eq!(value["id"], 7);
    }

    #[test]
    fn test_failure_carries_upstream_status() {
        let err = FetchError::RetriesExhausted {
            attempts: 3,
            last: TransportError::Status { status: 503 },
        };
        let outcome = FetchOutcome::failure("a.example", fp(), err, 3, Duration::ZERO);

        assert!(!outcome.is_success());
        assert_eq!(outcome.status(), Some(503));
        assert_eq!(outcome.error_kind(), Some(ErrorKind::RetriesExhausted));
        assert!(outcome.payload().is_none());
    }

    #[test]
    fn test_coalesced_copy_keeps_result() {
        let original = FetchOutcome::from_response(
            "a.example",
            fp(),
            RawResponse::new(200, "body"),
            1,
            Duration::from_millis(80),
            OutcomeSource::Network,
        );
        let shared = original.coalesced(Duration::from_millis(50));

        assert_eq!(shared.source(), OutcomeSource::Coalesced);
        assert_eq!(shared.payload(), original.payload());
        assert_eq!(shared.elapsed(), Duration::from_millis(50));
    }

    #[test]
    fn test_error_kind_names() {
        assert_eq!(FetchError::Cancelled.kind().as_str(), "cancelled");
        assert_eq!(
            FetchError::Transport(TransportError::Status { status: 404 }).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            serde_json::to_string(&ErrorKind::CircuitOpen).unwrap(),
            "\"circuit_open\""
        );
    }
}
