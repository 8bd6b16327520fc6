//! Batch execution.
//!
//! # Responsibilities
//! - Run many logical requests with a bound on how many are outstanding
//! - Keep results positionally matched to the input
//! - Aggregate success/failure counts and wall time
//!
//! # Design Decisions
//! - Gate permits are taken in submission order before each task is spawned,
//!   so queued work starts FIFO and may finish in any order
//! - One failure (or even a panicked task) never aborts the rest
//! - Shutdown stops admission; queued requests resolve as `Cancelled`

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::admission::ConcurrencyGate;
use crate::engine::orchestrator::FetchEngine;
use crate::observability::metrics;
use crate::request::{FetchError, FetchOutcome, Fingerprint, RequestDescriptor};

/// Aggregate result of [`FetchEngine::fetch_many`].
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// One outcome per input descriptor, in input order.
    pub outcomes: Vec<FetchOutcome>,
    pub successes: usize,
    pub failures: usize,
    /// Wall time of the whole batch.
    pub elapsed: Duration,
}

impl BatchReport {
    fn new(outcomes: Vec<FetchOutcome>, elapsed: Duration) -> Self {
        let successes = outcomes.iter().filter(|o| o.is_success()).count();
        let failures = outcomes.len() - successes;
        Self {
            outcomes,
            successes,
            failures,
            elapsed,
        }
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Successes over total, between 0.0 and 1.0. An empty batch reports 0.0.
    pub fn success_ratio(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        self.successes as f64 / self.outcomes.len() as f64
    }

    /// Success ratio as a percentage.
    pub fn success_rate(&self) -> f64 {
        self.success_ratio() * 100.0
    }

    pub fn is_complete_success(&self) -> bool {
        self.failures == 0
    }
}

enum Slot {
    Running {
        scope: String,
        fingerprint: Fingerprint,
        handle: JoinHandle<FetchOutcome>,
    },
    Done(FetchOutcome),
}

impl FetchEngine {
    /// Fetch every descriptor with at most `limit` outstanding at once.
    ///
    /// A `limit` of 0 is treated as 1.
    pub async fn fetch_many(&self, requests: Vec<RequestDescriptor>, limit: usize) -> BatchReport {
        let started = Instant::now();
        let gate = ConcurrencyGate::new(limit);
        let shutdown = self.shutdown_handle();
        let mut slots = Vec::with_capacity(requests.len());

        tracing::info!(requests = requests.len(), limit = gate.limit(), "Starting batch");

        for request in requests {
            // Requests still queued at shutdown are never started
            let admitted = tokio::select! {
                biased;
                _ = shutdown.wait() => Err(FetchError::Cancelled),
                permit = gate.acquire_owned() => permit,
            };
            let permit = match admitted {
                Ok(permit) => permit,
                Err(err) => {
                    slots.push(Slot::Done(FetchOutcome::failure(
                        request.scope(),
                        request.fingerprint(),
                        err,
                        0,
                        Duration::ZERO,
                    )));
                    continue;
                }
            };

            let scope = request.scope().to_string();
            let fingerprint = request.fingerprint();
            let engine = self.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                engine.fetch_one(&request).await
            });
            slots.push(Slot::Running {
                scope,
                fingerprint,
                handle,
            });
        }

        let mut outcomes = Vec::with_capacity(slots.len());
        for slot in slots {
            let outcome = match slot {
                Slot::Done(outcome) => outcome,
                Slot::Running {
                    scope,
                    fingerprint,
                    handle,
                } => match handle.await {
                    Ok(outcome) => outcome,
                    Err(join_err) => {
                        tracing::error!(scope = %scope, error = %join_err, "Batch task failed");
                        FetchOutcome::failure(
                            &scope,
                            fingerprint,
                            FetchError::Cancelled,
                            0,
                            started.elapsed(),
                        )
                    }
                },
            };
            outcomes.push(outcome);
        }

        let report = BatchReport::new(outcomes, started.elapsed());
        metrics::record_batch(report.successes, report.failures, report.elapsed);
        tracing::info!(
            total = report.total(),
            successes = report.successes,
            failures = report.failures,
            success_rate = report.success_rate(),
            elapsed = ?report.elapsed,
            "Batch complete"
        );
        report
    }
}
