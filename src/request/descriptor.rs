//! Immutable request descriptors.
//!
//! # Responsibilities
//! - Collect method, target, headers, body and per-request overrides
//! - Derive the scope (host) that circuit and rate state are keyed by
//! - Compute the fingerprint once at build time
//!
//! # Design Decisions
//! - Header names are case-insensitive and the last write for a name wins
//! - Builder errors are deferred to `build()` so call chains stay fluent
//! - Non-URL targets are allowed; their scope is the raw target

use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::request::fingerprint::Fingerprint;
use crate::resilience::retries::RetryPolicy;

/// How the cache treats a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Use the engine's default TTL.
    #[default]
    Default,
    /// Never read from or write to the cache.
    Bypass,
    /// Cache a success for this long instead of the default.
    Ttl(Duration),
}

/// Errors raised while building a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// Target string was empty.
    #[error("request target is empty")]
    EmptyTarget,

    /// Header name is not a valid token.
    #[error("invalid header name: {0}")]
    InvalidHeaderName(String),

    /// Header value contains forbidden bytes.
    #[error("invalid value for header {0}")]
    InvalidHeaderValue(String),
}

/// One logical request, frozen.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    request_id: Uuid,
    method: Method,
    target: String,
    headers: HeaderMap,
    body: Option<Bytes>,
    timeout: Option<Duration>,
    scope: String,
    retry_policy: Option<RetryPolicy>,
    cache_policy: CachePolicy,
    fingerprint: Fingerprint,
}

impl RequestDescriptor {
    /// Start building a request.
    pub fn builder(method: Method, target: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder {
            method,
            target: target.into(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            scope: None,
            retry_policy: None,
            cache_policy: CachePolicy::Default,
            error: None,
        }
    }

    /// Start building a GET request.
    pub fn get(target: impl Into<String>) -> DescriptorBuilder {
        Self::builder(Method::GET, target)
    }

    /// Start building a POST request.
    pub fn post(target: impl Into<String>) -> DescriptorBuilder {
        Self::builder(Method::POST, target)
    }

    /// Correlation id for logs. Not part of the fingerprint.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Per-request timeout override.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Grouping key for circuit and rate state.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Per-request retry override.
    pub fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry_policy.as_ref()
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Whether a successful answer to this request may be cached.
    ///
    /// Only safe methods are cacheable, and only when the policy allows it.
    pub fn is_cacheable(&self) -> bool {
        self.cache_policy != CachePolicy::Bypass
            && (self.method == Method::GET || self.method == Method::HEAD)
    }
}

/// Fluent builder for [`RequestDescriptor`].
#[derive(Debug)]
pub struct DescriptorBuilder {
    method: Method,
    target: String,
    headers: HeaderMap,
    body: Option<Bytes>,
    timeout: Option<Duration>,
    scope: Option<String>,
    retry_policy: Option<RetryPolicy>,
    cache_policy: CachePolicy,
    error: Option<DescriptorError>,
}

impl DescriptorBuilder {
    /// Set a header, replacing any previous value for the same name.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }

        let name = match HeaderName::from_bytes(name.as_bytes()) {
            Ok(name) => name,
            Err(_) => {
                self.error = Some(DescriptorError::InvalidHeaderName(name.to_string()));
                return self;
            }
        };
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => {
                self.error = Some(DescriptorError::InvalidHeaderValue(name.to_string()));
            }
        }
        self
    }

    /// Merge a prepared header map; later entries win.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in headers.iter() {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Override the engine's default deadline for this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the derived scope.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Freeze the descriptor.
    ///
    /// # Errors
    ///
    /// Returns the first header error recorded, or [`DescriptorError::EmptyTarget`].
    pub fn build(self) -> Result<RequestDescriptor, DescriptorError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let target = self.target.trim().to_string();
        if target.is_empty() {
            return Err(DescriptorError::EmptyTarget);
        }

        let fingerprint = Fingerprint::compute(
            &self.method,
            &target,
            &self.headers,
            self.body.as_deref(),
        );
        let scope = self.scope.unwrap_or_else(|| derive_scope(&target));

        Ok(RequestDescriptor {
            request_id: Uuid::new_v4(),
            method: self.method,
            target,
            headers: self.headers,
            body: self.body,
            timeout: self.timeout,
            scope,
            retry_policy: self.retry_policy,
            cache_policy: self.cache_policy,
            fingerprint,
        })
    }
}

/// Host (and explicit port) of a URL target, or the target itself.
fn derive_scope(target: &str) -> String {
    let Ok(url) = Url::parse(target) else {
        return target.to_string();
    };
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host.to_ascii_lowercase(), port),
        (Some(host), None) => host.to_ascii_lowercase(),
        (None, _) => target.to_string(),
    }
}
