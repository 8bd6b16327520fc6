//! Circuit breaker for target protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: target assumed down, requests fail fast
//! - Half-Open: a limited number of trial requests probe for recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: cooldown elapsed (checked on the next admission)
//! Half-Open → Closed: trial succeeds
//! Half-Open → Open: trial fails (cooldown restarts)
//! ```
//!
//! # Design Decisions
//! - One circuit per scope; a failing host never degrades others
//! - Admission hands out an RAII permit; dropping an unrecorded trial frees its slot
//! - Every transition bumps a generation so permits issued before it are ignored

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::request::FetchError;

/// Mode of a single circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitMode {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// What a finished request means for its circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitVerdict {
    /// The target answered (including with a client error).
    Success,
    /// The target failed transiently or timed out.
    Failure,
}

/// Point-in-time view of a circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub mode: CircuitMode,
    pub consecutive_failures: u32,
    pub trials_in_flight: u32,
    /// Time since the last transition.
    pub in_mode_for: Duration,
}

#[derive(Debug)]
struct CircuitState {
    mode: CircuitMode,
    consecutive_failures: u32,
    last_state_change: Instant,
    trials_in_flight: u32,
    generation: u64,
}

impl CircuitState {
    fn new() -> Self {
        Self {
            mode: CircuitMode::Closed,
            consecutive_failures: 0,
            last_state_change: Instant::now(),
            trials_in_flight: 0,
            generation: 0,
        }
    }

    fn transition(&mut self, to: CircuitMode, scope: &str) {
        let from = self.mode;
        self.mode = to;
        self.last_state_change = Instant::now();
        self.trials_in_flight = 0;
        self.generation += 1;
        if to == CircuitMode::Closed {
            self.consecutive_failures = 0;
        }

        match to {
            CircuitMode::Open => tracing::warn!(
                scope = %scope,
                from = from.as_str(),
                failures = self.consecutive_failures,
                "Circuit opened"
            ),
            _ => tracing::info!(
                scope = %scope,
                from = from.as_str(),
                to = to.as_str(),
                "Circuit transitioned"
            ),
        }
        metrics::record_circuit_transition(scope, to.as_str());
    }
}

/// Per-scope circuit breakers.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: Arc<CircuitBreakerConfig>,
    circuits: DashMap<String, Arc<Mutex<CircuitState>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            circuits: DashMap::new(),
        }
    }

    fn circuit(&self, scope: &str) -> Arc<Mutex<CircuitState>> {
        if let Some(existing) = self.circuits.get(scope) {
            return existing.clone();
        }
        self.circuits
            .entry(scope.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(CircuitState::new())))
            .clone()
    }

    /// Ask whether a request to `scope` may start.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::CircuitOpen`] while the circuit is open, or when
    /// every half-open trial slot is taken.
    pub fn try_acquire(&self, scope: &str) -> Result<CircuitPermit, FetchError> {
        if !self.config.enabled {
            return Ok(CircuitPermit::unguarded(scope));
        }

        let circuit = self.circuit(scope);
        let mut state = circuit.lock();

        if state.mode == CircuitMode::Open {
            if state.last_state_change.elapsed() < self.config.cooldown() {
                return Err(FetchError::CircuitOpen {
                    scope: scope.to_string(),
                });
            }
            state.transition(CircuitMode::HalfOpen, scope);
        }

        let trial = match state.mode {
            CircuitMode::Closed => false,
            CircuitMode::HalfOpen if state.trials_in_flight < self.config.half_open_trials => {
                state.trials_in_flight += 1;
                true
            }
            _ => {
                tracing::debug!(scope = %scope, "Half-open trial slots exhausted");
                return Err(FetchError::CircuitOpen {
                    scope: scope.to_string(),
                });
            }
        };

        let generation = state.generation;
        drop(state);

        Ok(CircuitPermit {
            scope: scope.to_string(),
            guarded: Some(Guarded {
                circuit,
                config: self.config.clone(),
                generation,
                trial,
            }),
        })
    }

    /// Current state of the circuit for `scope`, if one exists.
    pub fn stats(&self, scope: &str) -> Option<CircuitSnapshot> {
        let circuit = self.circuits.get(scope)?.clone();
        let state = circuit.lock();
        Some(CircuitSnapshot {
            mode: state.mode,
            consecutive_failures: state.consecutive_failures,
            trials_in_flight: state.trials_in_flight,
            in_mode_for: state.last_state_change.elapsed(),
        })
    }

    /// Forget the circuit for `scope`; it starts Closed again.
    pub fn reset(&self, scope: &str) {
        self.circuits.remove(scope);
    }

    /// Number of scopes with circuit state.
    pub fn len(&self) -> usize {
        self.circuits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.circuits.is_empty()
    }
}

#[derive(Debug)]
struct Guarded {
    circuit: Arc<Mutex<CircuitState>>,
    config: Arc<CircuitBreakerConfig>,
    generation: u64,
    trial: bool,
}

/// Admission ticket for one logical request.
#[derive(Debug)]
pub struct CircuitPermit {
    scope: String,
    guarded: Option<Guarded>,
}

impl CircuitPermit {
    fn unguarded(scope: &str) -> Self {
        Self {
            scope: scope.to_string(),
            guarded: None,
        }
    }

    /// Whether this permit is a half-open trial.
    pub fn is_trial(&self) -> bool {
        self.guarded.as_ref().is_some_and(|g| g.trial)
    }

    /// Record the request's result against its circuit.
    pub fn record(mut self, verdict: CircuitVerdict) {
        let Some(guarded) = self.guarded.take() else {
            return;
        };
        let mut state = guarded.circuit.lock();

        if state.generation != guarded.generation {
            tracing::trace!(scope = %self.scope, ?verdict, "Ignoring stale circuit result");
            return;
        }

        match (state.mode, verdict) {
            (CircuitMode::Closed, CircuitVerdict::Success) => {
                state.consecutive_failures = 0;
            }
            (CircuitMode::Closed, CircuitVerdict::Failure) => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= guarded.config.failure_threshold {
                    state.transition(CircuitMode::Open, &self.scope);
                }
            }
            (CircuitMode::HalfOpen, CircuitVerdict::Success) => {
                state.transition(CircuitMode::Closed, &self.scope);
            }
            (CircuitMode::HalfOpen, CircuitVerdict::Failure) => {
                state.consecutive_failures += 1;
                state.transition(CircuitMode::Open, &self.scope);
            }
            (CircuitMode::Open, _) => {}
        }
    }
}

impl Drop for CircuitPermit {
    fn drop(&mut self) {
        let Some(guarded) = self.guarded.take() else {
            return;
        };
        if !guarded.trial {
            return;
        }

        let mut state = guarded.circuit.lock();
        if state.generation == guarded.generation && state.mode == CircuitMode::HalfOpen {
            state.trials_in_flight = state.trials_in_flight.saturating_sub(1);
        }
    }
}
