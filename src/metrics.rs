//! API metrics collection
//!
//! Every `ApiMetrics` owns its own `Registry`, so several apps can live in one
//! process (integration tests build one per test).

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

use crate::resilience::CircuitState;

/// API metrics collector
#[derive(Clone)]
pub struct ApiMetrics {
    registry: Arc<Registry>,
    http_requests: IntCounterVec,
    http_request_duration: HistogramVec,
    rate_limit_rejections: IntCounterVec,
    circuit_breaker_state: IntGaugeVec,
    circuit_breaker_rejections: IntCounterVec,
    batch_transactions: IntCounterVec,
    batch_operations_applied: IntCounter,
}

impl std::fmt::Debug for ApiMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiMetrics").finish_non_exhaustive()
    }
}

impl ApiMetrics {
    /// Create new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let http_requests = IntCounterVec::new(
            Opts::new(
                "opsgate_http_requests_total",
                "Total number of HTTP requests handled",
            ),
            &["method", "route", "status"],
        )?;

        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "opsgate_http_request_duration_seconds",
                "HTTP request latency in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["method", "route"],
        )?;

        let rate_limit_rejections = IntCounterVec::new(
            Opts::new(
                "opsgate_rate_limit_rejections_total",
                "Requests rejected by the rate limiter",
            ),
            &["scope"],
        )?;

        let circuit_breaker_state = IntGaugeVec::new(
            Opts::new(
                "opsgate_circuit_breaker_state",
                "Circuit state per dependency (0 closed, 1 open, 2 half open)",
            ),
            &["dependency"],
        )?;

        let circuit_breaker_rejections = IntCounterVec::new(
            Opts::new(
                "opsgate_circuit_breaker_rejections_total",
                "Calls short-circuited by an open circuit",
            ),
            &["dependency"],
        )?;

        let batch_transactions = IntCounterVec::new(
            Opts::new(
                "opsgate_batch_transactions_total",
                "Batch transactions by outcome",
            ),
            &["outcome"],
        )?;

        let batch_operations_applied = IntCounter::new(
            "opsgate_batch_operations_applied_total",
            "Operations applied by committed batch transactions",
        )?;

        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(rate_limit_rejections.clone()))?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;
        registry.register(Box::new(circuit_breaker_rejections.clone()))?;
        registry.register(Box::new(batch_transactions.clone()))?;
        registry.register(Box::new(batch_operations_applied.clone()))?;

        Ok(Self {
            registry,
            http_requests,
            http_request_duration,
            rate_limit_rejections,
            circuit_breaker_state,
            circuit_breaker_rejections,
            batch_transactions,
            batch_operations_applied,
        })
    }

    /// Record one finished HTTP request
    pub fn record_request(&self, method: &str, route: &str, status: u16, elapsed: Duration) {
        self.http_requests
            .with_label_values(&[method, route, &status.to_string()])
            .inc();
        self.http_request_duration
            .with_label_values(&[method, route])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_rate_limit_rejection(&self, scope: &str) {
        self.rate_limit_rejections.with_label_values(&[scope]).inc();
    }

    pub fn set_circuit_state(&self, dependency: &str, state: CircuitState) {
        self.circuit_breaker_state
            .with_label_values(&[dependency])
            .set(state.as_gauge_value());
    }

    pub fn record_circuit_rejection(&self, dependency: &str) {
        self.circuit_breaker_rejections
            .with_label_values(&[dependency])
            .inc();
    }

    /// Record a finished batch; `applied` only counts toward committed batches
    pub fn record_batch(&self, committed: bool, applied: usize) {
        let outcome = if committed { "committed" } else { "rolled_back" };
        self.batch_transactions.with_label_values(&[outcome]).inc();
        if committed {
            self.batch_operations_applied.inc_by(applied as u64);
        }
    }

    /// Get metrics in the Prometheus text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}
