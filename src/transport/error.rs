//! Transport error definitions and transient/permanent classification.

use thiserror::Error;

/// Errors a transport attempt can end with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The transport gave up waiting for the peer.
    #[error("transport timed out")]
    Timeout,

    /// Connection broke mid-exchange.
    #[error("I/O error: {0}")]
    Io(String),

    /// The peer answered with an error status.
    #[error("upstream returned status {status}")]
    Status { status: u16 },

    /// The request can never succeed as built (bad URL, bad header, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Map an error status to a transport error. Returns `None` below 400.
    pub fn from_status(status: u16) -> Option<Self> {
        (status >= 400).then_some(Self::Status { status })
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Connection errors, timeouts, 5xx, 408 and 429 are transient.
    /// Other 4xx and malformed requests are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Timeout | Self::Io(_) => true,
            Self::Status { status } => *status >= 500 || *status == 408 || *status == 429,
            Self::InvalidRequest(_) => false,
        }
    }

    /// Status code, when the peer produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::Timeout.is_transient());
        assert!(TransportError::Connect("refused".into()).is_transient());
        assert!(TransportError::Status { status: 503 }.is_transient());
        assert!(TransportError::Status { status: 429 }.is_transient());
        assert!(TransportError::Status { status: 408 }.is_transient());

        assert!(!TransportError::Status { status: 404 }.is_transient());
        assert!(!TransportError::Status { status: 400 }.is_transient());
        assert!(!TransportError::InvalidRequest("no scheme".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::Status { status: 502 };
        assert_eq!(err.to_string(), "upstream returned status 502");
        assert_eq!(err.status(), Some(502));
        assert_eq!(TransportError::Timeout.status(), None);
    }
}
