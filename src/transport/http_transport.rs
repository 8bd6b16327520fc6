//! HTTP transport backed by reqwest.
//!
//! # Responsibilities
//! - Build a client with user agent, connect/read timeouts and redirect policy
//! - Translate a [`RequestDescriptor`] into a reqwest request
//! - Map reqwest failures onto [`TransportError`] variants
//!
//! # Design Decisions
//! - Every status is returned as a response; the engine decides what is an error
//! - The per-request timeout is the time left on the engine deadline

use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use url::Url;

use crate::config::{TimeoutConfig, TransportConfig};
use crate::request::RequestDescriptor;
use crate::resilience::timeouts::Deadline;
use crate::transport::{RawResponse, Transport, TransportError};

/// Transport that performs real HTTP requests.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a transport from configuration.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the TLS backend or client cannot be initialised.
    pub fn new(transport: &TransportConfig, timeouts: &TimeoutConfig) -> Result<Self, reqwest::Error> {
        let redirect = if transport.follow_redirects {
            Policy::limited(transport.max_redirects)
        } else {
            Policy::none()
        };

        let client = Client::builder()
            .user_agent(transport.user_agent.clone())
            .connect_timeout(timeouts.connect())
            .read_timeout(timeouts.read())
            .redirect(redirect)
            .build()?;

        Ok(Self { client })
    }

    /// Wrap an already configured client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: &RequestDescriptor,
        deadline: &Deadline,
    ) -> Result<RawResponse, TransportError> {
        let url = Url::parse(request.target())
            .map_err(|e| TransportError::InvalidRequest(format!("{}: {}", request.target(), e)))?;

        let mut builder = self
            .client
            .request(request.method().clone(), url)
            .headers(request.headers().clone())
            .timeout(deadline.remaining());

        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(classify_error)?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(classify_error)?;

        tracing::trace!(
            target_url = %request.target(),
            status,
            bytes = body.len(),
            "HTTP exchange complete"
        );

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

fn classify_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else if err.is_builder() || err.is_redirect() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Io(err.to_string())
    }
}
