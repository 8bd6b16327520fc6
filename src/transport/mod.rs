//! Transport collaborator boundary.
//!
//! # Data Flow
//! ```text
//! engine attempt loop
//!     → Transport::execute(descriptor, deadline)
//!     → RawResponse (status, headers, body) | TransportError
//!     → RawResponse::into_result (status >= 400 becomes TransportError::Status)
//!     → retries.rs decides what happens next
//! ```
//!
//! # Design Decisions
//! - The engine never parses payloads; it only sees status, headers and bytes
//! - Errors carry just enough shape to decide retryability
//! - http_transport.rs is one implementation; tests plug in scripted transports

pub mod error;
pub mod http_transport;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use ::http::HeaderMap;

use crate::request::RequestDescriptor;
use crate::resilience::timeouts::Deadline;

pub use error::TransportError;
pub use http_transport::HttpTransport;

/// Response as handed back by a transport, before any classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    /// Status code (HTTP semantics; other protocols map onto them).
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw payload.
    pub body: Bytes,
}

impl RawResponse {
    /// Create a response with no headers.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn error statuses into a [`TransportError::Status`].
    pub fn into_result(self) -> Result<Self, TransportError> {
        match TransportError::from_status(self.status) {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// A request/response operation the engine can drive.
///
/// Implementations should honour the deadline where they can; the engine
/// enforces it regardless by dropping the call once it expires.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one attempt of the request.
    async fn execute(
        &self,
        request: &RequestDescriptor,
        deadline: &Deadline,
    ) -> Result<RawResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn execute(
        &self,
        request: &RequestDescriptor,
        deadline: &Deadline,
    ) -> Result<RawResponse, TransportError> {
        (**self).execute(request, deadline).await
    }
}
