//! # Circuit Breaker Metrics
//!
//! Serializable snapshots of breaker counters, served by
//! `GET /api/v1/circuits` and reported by the readiness probe.

use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};

/// Metrics for a single circuit breaker instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Dependency the breaker guards
    pub name: String,

    pub current_state: CircuitState,

    /// Calls that were admitted and ran to an outcome
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,

    /// Failures caused by the call timeout (included in `failure_count`)
    pub timeout_count: u64,

    /// Calls short-circuited without invoking the dependency
    pub rejected_count: u64,

    /// Half-open trial calls admitted so far
    pub trial_calls: u64,

    /// Failures currently inside the rolling window
    pub failures_in_window: u64,

    /// Calculated failure rate (0.0 to 1.0)
    pub failure_rate: f64,

    pub average_duration_ms: f64,

    pub retry_after_seconds: u64,
}
