//! # Circuit Breaker Implementation
//!
//! Fault isolation for unreliable dependencies. Three states:
//! Closed (calls pass, failures counted in a rolling window), Open (calls
//! fail fast without running) and HalfOpen (exactly one trial call decides
//! whether to close again or re-open).
//!
//! State transitions for one breaker are serialized behind a single
//! `parking_lot::Mutex` that is never held across an `.await`. Breakers for
//! different dependencies share nothing.

use crate::config::BreakerSettings;
use crate::metrics::ApiMetrics;
use crate::resilience::CircuitBreakerMetrics;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Lock-free counters, kept outside the state mutex so snapshots never
/// contend with admission.
#[derive(Debug, Default)]
struct AtomicCircuitBreakerMetrics {
    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    timeout_count: AtomicU64,
    rejected_count: AtomicU64,
    trial_calls: AtomicU64,
    total_duration_nanos: AtomicU64,
}

impl AtomicCircuitBreakerMetrics {
    #[inline]
    fn record_success(&self, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    #[inline]
    fn record_failure(&self, duration: Duration, timed_out: bool) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        if timed_out {
            self.timeout_count.fetch_add(1, Ordering::Relaxed);
        }
        self.total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    #[inline]
    fn record_rejection(&self) {
        self.rejected_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_trial(&self) {
        self.trial_calls.fetch_add(1, Ordering::Relaxed);
    }
}

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - a single trial call is allowed through
    HalfOpen = 2,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    pub fn as_gauge_value(&self) -> i64 {
        *self as i64
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open (or a trial call is already running); the operation was not invoked
    #[error("Circuit breaker is open for {component}, retry after {retry_after_seconds}s")]
    CircuitOpen {
        component: String,
        retry_after_seconds: u64,
    },

    /// Operation failed and was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),

    /// Operation exceeded the call timeout and was recorded as a failure
    #[error("Operation timed out after {timeout_ms}ms for {component}")]
    Timeout { component: String, timeout_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permit {
    Normal,
    Trial,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    /// Failure instants still inside the rolling window (closed state only)
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Core circuit breaker implementation
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,
    settings: BreakerSettings,
    inner: Mutex<BreakerState>,
    metrics: AtomicCircuitBreakerMetrics,
    exporter: Option<ApiMetrics>,
}

/// Releases the half-open trial slot if the trial future is dropped before
/// it reports an outcome.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl TrialGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.breaker.inner.lock();
            if inner.state == CircuitState::HalfOpen {
                inner.trial_in_flight = false;
            }
            warn!(component = %self.breaker.name, "Trial call abandoned before completion");
        }
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = settings.failure_threshold,
            failure_window_seconds = settings.failure_window_seconds,
            cooldown_seconds = settings.cooldown_seconds,
            call_timeout_ms = settings.call_timeout_ms,
            "Circuit breaker initialized"
        );

        Self {
            name,
            settings,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                trial_in_flight: false,
            }),
            metrics: AtomicCircuitBreakerMetrics::default(),
            exporter: None,
        }
    }

    /// Mirror state changes and rejections into the Prometheus registry
    pub fn with_exporter(mut self, exporter: ApiMetrics) -> Self {
        exporter.set_circuit_state(&self.name, CircuitState::Closed);
        self.exporter = Some(exporter);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Current state. An open circuit whose cooldown has elapsed still reads
    /// `Open` until the next caller claims the trial.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(self.settings.cooldown_seconds)
    }

    fn failure_window(&self) -> Duration {
        Duration::from_secs(self.settings.failure_window_seconds)
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.call_timeout_ms)
    }

    /// Execute an operation with circuit breaker protection.
    ///
    /// The operation is never invoked while the circuit is open. A call that
    /// exceeds `call_timeout_ms` is cancelled and counted as a failure.
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.acquire()?;
        let mut guard = TrialGuard {
            breaker: self,
            armed: permit == Permit::Trial,
        };

        let start = Instant::now();
        let outcome = tokio::time::timeout(self.call_timeout(), operation()).await;
        let duration = start.elapsed();
        guard.disarm();

        match outcome {
            Ok(Ok(value)) => {
                self.record_success(permit, duration);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.record_failure(permit, duration, false);
                Err(CircuitBreakerError::OperationFailed(e))
            }
            Err(_) => {
                self.record_failure(permit, duration, true);
                Err(CircuitBreakerError::Timeout {
                    component: self.name.clone(),
                    timeout_ms: self.settings.call_timeout_ms,
                })
            }
        }
    }

    /// Admission check; claims the trial slot when the cooldown has elapsed
    fn acquire<E>(&self) -> Result<Permit, CircuitBreakerError<E>> {
        let now = Instant::now();
        let mut transitioned = false;

        let decision = {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::Closed => Ok(Permit::Normal),
                CircuitState::Open => {
                    let opened_at = *inner.opened_at.get_or_insert(now);
                    let elapsed = now.saturating_duration_since(opened_at);
                    if elapsed >= self.cooldown() {
                        inner.state = CircuitState::HalfOpen;
                        inner.trial_in_flight = true;
                        transitioned = true;
                        Ok(Permit::Trial)
                    } else {
                        Err(ceil_seconds(self.cooldown() - elapsed))
                    }
                }
                CircuitState::HalfOpen if !inner.trial_in_flight => {
                    inner.trial_in_flight = true;
                    Ok(Permit::Trial)
                }
                CircuitState::HalfOpen => Err(ceil_seconds(self.call_timeout())),
            }
        };

        if transitioned {
            info!(component = %self.name, "Circuit breaker half-open (testing recovery)");
            self.export_state(CircuitState::HalfOpen);
        }

        match decision {
            Ok(permit) => {
                if permit == Permit::Trial {
                    self.metrics.record_trial();
                }
                Ok(permit)
            }
            Err(retry_after_seconds) => {
                self.metrics.record_rejection();
                if let Some(exporter) = &self.exporter {
                    exporter.record_circuit_rejection(&self.name);
                }
                debug!(
                    component = %self.name,
                    retry_after_seconds,
                    "Call rejected by circuit breaker"
                );
                Err(CircuitBreakerError::CircuitOpen {
                    component: self.name.clone(),
                    retry_after_seconds,
                })
            }
        }
    }

    fn record_success(&self, permit: Permit, duration: Duration) {
        self.metrics.record_success(duration);
        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Operation succeeded"
        );

        if permit != Permit::Trial {
            return;
        }

        let closed = {
            let mut inner = self.inner.lock();
            if inner.state == CircuitState::HalfOpen {
                inner.state = CircuitState::Closed;
                inner.failures.clear();
                inner.opened_at = None;
                inner.trial_in_flight = false;
                true
            } else {
                false
            }
        };

        if closed {
            info!(
                component = %self.name,
                total_calls = self.metrics.total_calls.load(Ordering::Relaxed),
                "Circuit breaker closed (recovered)"
            );
            self.export_state(CircuitState::Closed);
        }
    }

    fn record_failure(&self, permit: Permit, duration: Duration, timed_out: bool) {
        self.metrics.record_failure(duration, timed_out);
        error!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            timed_out,
            "Operation failed"
        );

        let now = Instant::now();
        let opened = {
            let mut inner = self.inner.lock();
            match (inner.state, permit) {
                (CircuitState::Closed, _) => {
                    inner.failures.push_back(now);
                    let window = self.failure_window();
                    while inner
                        .failures
                        .front()
                        .is_some_and(|t| now.saturating_duration_since(*t) > window)
                    {
                        inner.failures.pop_front();
                    }
                    if inner.failures.len() >= self.settings.failure_threshold as usize {
                        let failures_in_window = inner.failures.len();
                        inner.state = CircuitState::Open;
                        inner.opened_at = Some(now);
                        inner.failures.clear();
                        Some(failures_in_window)
                    } else {
                        None
                    }
                }
                (CircuitState::HalfOpen, Permit::Trial) => {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    inner.trial_in_flight = false;
                    Some(1)
                }
                // Late results from calls admitted before the circuit opened
                _ => None,
            }
        };

        if let Some(failures_in_window) = opened {
            error!(
                component = %self.name,
                failures_in_window,
                failure_threshold = self.settings.failure_threshold,
                cooldown_seconds = self.settings.cooldown_seconds,
                "Circuit breaker opened (failing fast)"
            );
            self.export_state(CircuitState::Open);
        }
    }

    fn export_state(&self, state: CircuitState) {
        if let Some(exporter) = &self.exporter {
            exporter.set_circuit_state(&self.name, state);
        }
    }

    /// Seconds until an open circuit admits its trial call (0 when not open)
    pub fn retry_after_seconds(&self) -> u64 {
        let inner = self.inner.lock();
        match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(opened_at)) => {
                let elapsed = Instant::now().saturating_duration_since(opened_at);
                self.cooldown()
                    .checked_sub(elapsed)
                    .map(ceil_seconds)
                    .unwrap_or(0)
            }
            _ => 0,
        }
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let (state, failures_in_window) = {
            let inner = self.inner.lock();
            (inner.state, inner.failures.len() as u64)
        };

        let total_calls = self.metrics.total_calls.load(Ordering::Relaxed);
        let success_count = self.metrics.success_count.load(Ordering::Relaxed);
        let failure_count = self.metrics.failure_count.load(Ordering::Relaxed);
        let total_nanos = self.metrics.total_duration_nanos.load(Ordering::Relaxed);

        let (failure_rate, average_duration_ms) = if total_calls > 0 {
            (
                failure_count as f64 / total_calls as f64,
                total_nanos as f64 / total_calls as f64 / 1_000_000.0,
            )
        } else {
            (0.0, 0.0)
        };

        CircuitBreakerMetrics {
            name: self.name.clone(),
            current_state: state,
            total_calls,
            success_count,
            failure_count,
            timeout_count: self.metrics.timeout_count.load(Ordering::Relaxed),
            rejected_count: self.metrics.rejected_count.load(Ordering::Relaxed),
            trial_calls: self.metrics.trial_calls.load(Ordering::Relaxed),
            failures_in_window,
            failure_rate,
            average_duration_ms,
            retry_after_seconds: self.retry_after_seconds(),
        }
    }
}

/// Whole seconds, rounded up, never below 1
fn ceil_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    secs.max(1)
}
