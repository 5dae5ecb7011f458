//! Circuit Breaker Pattern
//!
//! Stops calling a backend service for a cooldown period after repeated
//! server-side failures. One circuit per service name, created lazily on
//! first reference and kept for the life of the process.
//!
//! Half-open is not stored: once the open window has elapsed the circuit
//! lets calls through, and the next recorded outcome decides whether it
//! closes or re-opens. Several concurrent callers may be let through as
//! trials at the same time; no single-trial slot is enforced.

use crate::domain::ports::Clock;
use crate::domain::CallOutcome;
use crate::infrastructure::clock::SystemClock;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// How long the circuit rejects calls once open
    pub open_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_window: Duration::from_secs(30),
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - requests allowed
    Closed,
    /// Circuit tripped - requests rejected without a network attempt
    Open,
    /// Open window elapsed - next calls are trials
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

impl Default for CircuitState {
    fn default() -> Self {
        CircuitState::Closed
    }
}

/// Per-service circuit.
#[derive(Debug, Default)]
struct ServiceCircuit {
    /// Consecutive failures since the last success
    failures: AtomicU32,
    /// End of the open window (epoch ms), 0 when not tripped
    open_until_ms: AtomicU64,
    /// Most recent failure description
    last_error: Mutex<Option<String>>,
}

impl ServiceCircuit {
    fn state_at(&self, now: u64) -> CircuitState {
        match self.open_until_ms.load(Ordering::SeqCst) {
            0 => CircuitState::Closed,
            until if now < until => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }
}

/// Read-only view of one circuit, for health reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failures: u32,
    /// Remaining open time, 0 unless the circuit is open
    pub open_for_ms: u64,
    pub last_error: Option<String>,
}

/// Circuit breaker manager keyed by service name.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    circuits: DashMap<String, ServiceCircuit>,
}

impl CircuitBreaker {
    /// Create a circuit breaker driven by `clock`.
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            circuits: DashMap::new(),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn get_or_create(
        &self,
        service: &str,
    ) -> dashmap::mapref::one::RefMut<'_, String, ServiceCircuit> {
        self.circuits.entry(service.to_string()).or_default()
    }

    /// True while the service's open window has not elapsed.
    ///
    /// Returns false once `now >= open_until`, letting the next call through
    /// as a trial.
    pub fn is_open(&self, service: &str) -> bool {
        let now = self.clock.now_ms();
        self.get_or_create(service).state_at(now) == CircuitState::Open
    }

    /// Record a successful call. Closes the circuit from any state.
    pub fn record_success(&self, service: &str) {
        let circuit = self.get_or_create(service);
        let was_tripped = circuit.open_until_ms.swap(0, Ordering::SeqCst) != 0;
        circuit.failures.store(0, Ordering::SeqCst);

        if was_tripped {
            tracing::info!("circuit breaker for {} closed (recovered)", service);
        }
    }

    /// Record a failed call.
    ///
    /// At or above the threshold the circuit (re-)opens with a fresh window.
    pub fn record_failure(&self, service: &str, reason: &str) {
        let circuit = self.get_or_create(service);
        let now = self.clock.now_ms();
        let was_open = circuit.state_at(now) == CircuitState::Open;

        let failures = circuit.failures.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        *circuit.last_error.lock() = Some(reason.to_string());

        if failures >= self.config.failure_threshold {
            let until = now.saturating_add(self.config.open_window.as_millis() as u64);
            circuit.open_until_ms.store(until, Ordering::SeqCst);
            if !was_open {
                tracing::warn!(
                    "circuit breaker for {} opened after {} failures: {}",
                    service,
                    failures,
                    reason
                );
            }
        } else {
            tracing::debug!(
                "failure {}/{} recorded for {}: {}",
                failures,
                self.config.failure_threshold,
                service,
                reason
            );
        }
    }

    /// Apply a classified outcome.
    pub fn record(&self, service: &str, outcome: &CallOutcome) {
        match outcome {
            CallOutcome::Success => self.record_success(service),
            CallOutcome::Failure(reason) => self.record_failure(service, reason),
        }
    }

    /// Remaining open time for a service, zero when not open.
    pub fn retry_after(&self, service: &str) -> Duration {
        let now = self.clock.now_ms();
        let until = self.get_or_create(service).open_until_ms.load(Ordering::SeqCst);
        Duration::from_millis(until.saturating_sub(now))
    }

    /// Snapshot of one circuit.
    pub fn snapshot(&self, service: &str) -> CircuitSnapshot {
        let now = self.clock.now_ms();
        let circuit = self.get_or_create(service);
        Self::describe(&circuit, now)
    }

    /// Snapshots of every circuit referenced so far, sorted by name.
    pub fn all_snapshots(&self) -> Vec<(String, CircuitSnapshot)> {
        let now = self.clock.now_ms();
        let mut all: Vec<(String, CircuitSnapshot)> = self
            .circuits
            .iter()
            .map(|e| (e.key().clone(), Self::describe(e.value(), now)))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    fn describe(circuit: &ServiceCircuit, now: u64) -> CircuitSnapshot {
        let state = circuit.state_at(now);
        let open_for_ms = match state {
            CircuitState::Open => circuit
                .open_until_ms
                .load(Ordering::SeqCst)
                .saturating_sub(now),
            _ => 0,
        };
        CircuitSnapshot {
            state,
            failures: circuit.failures.load(Ordering::SeqCst),
            open_for_ms,
            last_error: circuit.last_error.lock().clone(),
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default(), Arc::new(SystemClock))
    }
}
