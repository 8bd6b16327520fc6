//! The fetch orchestrator.
//!
//! # Responsibilities
//! - Run one logical request through cache, dedup, rate limiter, circuit
//!   breaker, transport and retry loop
//! - Record the final verdict into the circuit and successes into the cache
//! - Publish the outcome to every caller coalesced onto the request
//!
//! # Design Decisions
//! - One deadline per logical request bounds every wait in the pipeline
//! - Shutdown is raced against the whole pipeline; losing drops every guard
//! - Transport calls are bounded engine-wide, independently of batches

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::time::Instant;
use tracing::Instrument;

use crate::admission::{ConcurrencyGate, RateLimiter};
use crate::cache::{self, CacheStats, ResponseCache};
use crate::config::{validate_config, EngineConfig, ValidationError};
use crate::dedup::{Abandoned, Claim, RequestDeduplicator, Waiter};
use crate::lifecycle::Shutdown;
use crate::observability::{EventKind, FetchEvent, MetricsRecorderSink, MetricsSink};
use crate::request::{CachePolicy, FetchError, FetchOutcome, OutcomeSource, RequestDescriptor};
use crate::resilience::{
    CircuitBreakerRegistry, CircuitSnapshot, CircuitVerdict, Deadline, RetryPolicy, RetryState,
};
use crate::transport::{RawResponse, Transport};

/// Errors raised while building an engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(
        "invalid configuration: {}",
        .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    )]
    InvalidConfig(Vec<ValidationError>),

    #[error("no transport configured")]
    MissingTransport,
}

struct EngineInner {
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    cache: Option<ResponseCache>,
    dedup: RequestDeduplicator,
    rate_limiter: RateLimiter,
    circuits: CircuitBreakerRegistry,
    retry_policy: RetryPolicy,
    transport_gate: ConcurrencyGate,
    sink: Arc<dyn MetricsSink>,
    shutdown: Shutdown,
}

/// Resilient fetch engine. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct FetchEngine {
    inner: Arc<EngineInner>,
}

impl fmt::Debug for FetchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchEngine")
            .field("in_flight", &self.inner.dedup.in_flight())
            .field("transport_calls", &self.inner.transport_gate.in_use())
            .field("shutdown", &self.inner.shutdown.is_triggered())
            .finish_non_exhaustive()
    }
}

/// Builder for [`FetchEngine`].
pub struct EngineBuilder {
    config: EngineConfig,
    transport: Option<Arc<dyn Transport>>,
    sink: Option<Arc<dyn MetricsSink>>,
    shutdown: Option<Shutdown>,
}

impl EngineBuilder {
    /// Transport every attempt goes through. Required.
    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Shared transport handle.
    pub fn transport_arc(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Where per-attempt events go. Defaults to the `metrics` facade.
    pub fn metrics_sink<S: MetricsSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Use an existing shutdown coordinator (e.g. one wired to signals).
    pub fn shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Validate the configuration and assemble the engine.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidConfig`] with every validation problem, or
    /// [`EngineError::MissingTransport`].
    pub fn build(self) -> Result<FetchEngine, EngineError> {
        validate_config(&self.config).map_err(EngineError::InvalidConfig)?;
        let transport = self.transport.ok_or(EngineError::MissingTransport)?;
        let config = self.config;

        let cache = config.cache.enabled.then(|| cache::response_cache(&config.cache));
        let inner = EngineInner {
            transport,
            cache,
            dedup: RequestDeduplicator::new(),
            rate_limiter: RateLimiter::new(config.rate_limit.clone()),
            circuits: CircuitBreakerRegistry::new(config.circuit_breaker.clone()),
            retry_policy: RetryPolicy::from_config(&config.retries),
            transport_gate: ConcurrencyGate::new(config.concurrency.max_concurrent_requests),
            sink: self
                .sink
                .unwrap_or_else(|| Arc::new(MetricsRecorderSink) as Arc<dyn MetricsSink>),
            shutdown: self.shutdown.unwrap_or_default(),
            config,
        };

        tracing::debug!(
            max_concurrent_requests = inner.config.concurrency.max_concurrent_requests,
            cache = inner.cache.is_some(),
            rate_limit = inner.config.rate_limit.enabled,
            circuit_breaker = inner.config.circuit_breaker.enabled,
            "Fetch engine built"
        );

        Ok(FetchEngine {
            inner: Arc::new(inner),
        })
    }
}

impl FetchEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            transport: None,
            sink: None,
            shutdown: None,
        }
    }

    /// Run one logical request to completion.
    ///
    /// Never fails as a call: every failure is described by the outcome.
    pub async fn fetch_one(&self, request: &RequestDescriptor) -> FetchOutcome {
        let span = tracing::info_span!(
            "fetch",
            request_id = %request.request_id(),
            scope = %request.scope(),
            fingerprint = %request.fingerprint().short(),
        );
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: &RequestDescriptor) -> FetchOutcome {
        let started = Instant::now();
        let budget = request
            .timeout()
            .unwrap_or_else(|| self.inner.config.timeouts.total());
        let deadline = Deadline::starting_at(started, budget);

        if self.inner.shutdown.is_triggered() {
            return self.failed(request, FetchError::Cancelled, 0, started);
        }

        if let Some(hit) = self.cached(request, started) {
            return hit;
        }

        let guard = match self.inner.dedup.claim(request.fingerprint()) {
            Claim::Executor(guard) => guard,
            Claim::Waiter(waiter) => return self.await_shared(request, waiter, &deadline, started).await,
        };

        // An identical request may have finished between the lookup and the claim
        if let Some(hit) = self.cached(request, started) {
            guard.resolve(hit.clone());
            return hit;
        }

        let (result, attempts) = self.execute(request, &deadline).await;
        if let Ok(response) = &result {
            self.store(request, response);
        }

        let outcome = match result {
            Ok(response) => {
                tracing::debug!(status = response.status, attempts, "Request succeeded");
                FetchOutcome::from_response(
                    request.scope(),
                    request.fingerprint(),
                    response,
                    attempts,
                    started.elapsed(),
                    OutcomeSource::Network,
                )
            }
            Err(err) => self.failed(request, err, attempts, started),
        };

        guard.resolve(outcome.clone());
        outcome
    }

    fn cached(&self, request: &RequestDescriptor, started: Instant) -> Option<FetchOutcome> {
        if !request.is_cacheable() {
            return None;
        }
        let cache = self.inner.cache.as_ref()?;
        let response = cache.get(&request.fingerprint())?;

        tracing::debug!(status = response.status, "Served from cache");
        self.emit(request, EventKind::CacheHit, started, true);
        Some(FetchOutcome::from_response(
            request.scope(),
            request.fingerprint(),
            response,
            0,
            started.elapsed(),
            OutcomeSource::Cache,
        ))
    }

    fn store(&self, request: &RequestDescriptor, response: &RawResponse) {
        let Some(cache) = &self.inner.cache else {
            return;
        };
        if !response.is_success() || !request.is_cacheable() {
            return;
        }

        let ttl = match request.cache_policy() {
            CachePolicy::Ttl(ttl) => ttl,
            _ => self.inner.config.cache.default_ttl(),
        };
        if !cache.put(request.fingerprint(), response.clone(), ttl) {
            tracing::debug!(bytes = response.body.len(), "Response not cached");
        }
    }

    async fn await_shared(
        &self,
        request: &RequestDescriptor,
        waiter: Waiter<FetchOutcome>,
        deadline: &Deadline,
        started: Instant,
    ) -> FetchOutcome {
        tracing::debug!("Joining in-flight request");

        let shared = tokio::select! {
            biased;
            _ = self.inner.shutdown.wait() => Err(FetchError::Cancelled),
            result = deadline.run(waiter.wait()) => {
                result.and_then(|shared| shared.map_err(|Abandoned| FetchError::Cancelled))
            }
        };

        match shared {
            Ok(outcome) => {
                self.emit(request, EventKind::Coalesced, started, outcome.is_success());
                outcome.coalesced(started.elapsed())
            }
            Err(err) => self.failed(request, err, 0, started),
        }
    }

    /// Admission, attempts and circuit bookkeeping for the executor.
    async fn execute(
        &self,
        request: &RequestDescriptor,
        deadline: &Deadline,
    ) -> (Result<RawResponse, FetchError>, u32) {
        let mut attempts = 0;
        let result = tokio::select! {
            biased;
            _ = self.inner.shutdown.wait() => Err(FetchError::Cancelled),
            result = self.admit_and_attempt(request, deadline, &mut attempts) => result,
        };
        (result, attempts)
    }

    async fn admit_and_attempt(
        &self,
        request: &RequestDescriptor,
        deadline: &Deadline,
        attempts: &mut u32,
    ) -> Result<RawResponse, FetchError> {
        self.inner.rate_limiter.acquire(request.scope(), deadline).await?;
        let permit = self.inner.circuits.try_acquire(request.scope())?;

        let result = deadline
            .run(self.attempt_loop(request, deadline, attempts))
            .await
            .and_then(|inner| inner);

        match &result {
            // The target answered, even if it refused the request
            Ok(_) | Err(FetchError::Transport(_)) => permit.record(CircuitVerdict::Success),
            Err(FetchError::RetriesExhausted { .. }) | Err(FetchError::Timeout(_)) => {
                permit.record(CircuitVerdict::Failure)
            }
            Err(_) => drop(permit),
        }
        result
    }

    async fn attempt_loop(
        &self,
        request: &RequestDescriptor,
        deadline: &Deadline,
        attempts: &mut u32,
    ) -> Result<RawResponse, FetchError> {
        let policy = request.retry_policy().unwrap_or(&self.inner.retry_policy);
        let mut retry = RetryState::new(policy);

        loop {
            let result = {
                let _slot = self.inner.transport_gate.acquire().await?;
                *attempts += 1;
                let attempt_started = Instant::now();
                let result = self
                    .inner
                    .transport
                    .execute(request, deadline)
                    .await
                    .and_then(RawResponse::into_result);
                self.emit(request, EventKind::Attempt, attempt_started, result.is_ok());
                result
            };
            let attempt = *attempts;

            let err = match result {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if !err.is_transient() {
                tracing::debug!(attempt, error = %err, "Non-retryable failure");
                return Err(FetchError::Transport(err));
            }

            match retry.next_delay(attempt, &err) {
                Some(delay) => {
                    tracing::info!(attempt, delay = ?delay, error = %err, "Retrying request");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(FetchError::RetriesExhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
            }
        }
    }

    fn failed(
        &self,
        request: &RequestDescriptor,
        error: FetchError,
        attempts: u32,
        started: Instant,
    ) -> FetchOutcome {
        if attempts == 0 {
            self.emit(request, EventKind::Rejected, started, false);
        }
        tracing::warn!(
            kind = error.kind().as_str(),
            attempts,
            error = %error,
            "Request failed"
        );
        FetchOutcome::failure(
            request.scope(),
            request.fingerprint(),
            error,
            attempts,
            started.elapsed(),
        )
    }

    fn emit(&self, request: &RequestDescriptor, kind: EventKind, since: Instant, success: bool) {
        self.inner.sink.record(FetchEvent {
            scope: request.scope().to_string(),
            kind,
            duration: since.elapsed(),
            success,
        });
    }

    // --- Introspection ---

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Circuit state for `scope`, if any request has touched it.
    pub fn circuit_state(&self, scope: &str) -> Option<CircuitSnapshot> {
        self.inner.circuits.stats(scope)
    }

    /// Cache counters; `None` when caching is disabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.inner.cache.as_ref().map(ResponseCache::stats)
    }

    /// Drop any cached response for `request`.
    pub fn invalidate(&self, request: &RequestDescriptor) -> bool {
        self.inner
            .cache
            .as_ref()
            .is_some_and(|cache| cache.invalidate(&request.fingerprint()))
    }

    /// Logical requests currently executing (coalesced waiters not counted).
    pub fn in_flight(&self) -> usize {
        self.inner.dedup.in_flight()
    }

    /// Transport calls currently outstanding.
    pub fn transport_calls(&self) -> usize {
        self.inner.transport_gate.in_use()
    }

    /// Cancel every in-flight and future request with `Cancelled`.
    pub fn shutdown(&self) {
        self.inner.shutdown.trigger();
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.inner.shutdown.clone()
    }
}
