//! # Circuit Breaker Manager
//!
//! One breaker per guarded dependency, created lazily with that dependency's
//! configured thresholds.

use crate::config::CircuitBreakersConfig;
use crate::metrics::ApiMetrics;
use crate::resilience::{CircuitBreaker, CircuitBreakerMetrics};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// Manager for the circuit breakers of every guarded dependency
#[derive(Debug)]
pub struct CircuitBreakerManager {
    circuit_breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitBreakersConfig,
    exporter: Option<ApiMetrics>,
}

impl CircuitBreakerManager {
    pub fn new(config: CircuitBreakersConfig) -> Self {
        Self {
            circuit_breakers: DashMap::new(),
            config,
            exporter: None,
        }
    }

    /// Breakers created from now on publish state to `exporter`
    pub fn with_exporter(mut self, exporter: ApiMetrics) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Get or create the circuit breaker for a dependency
    pub fn get_circuit_breaker(&self, dependency: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.circuit_breakers.get(dependency) {
            return Arc::clone(breaker.value());
        }

        let entry = self
            .circuit_breakers
            .entry(dependency.to_string())
            .or_insert_with(|| {
                let mut breaker =
                    CircuitBreaker::new(dependency, self.config.settings_for(dependency));
                if let Some(exporter) = &self.exporter {
                    breaker = breaker.with_exporter(exporter.clone());
                }
                info!(component = dependency, "Created new circuit breaker");
                Arc::new(breaker)
            });
        Arc::clone(entry.value())
    }

    /// Get all circuit breaker names
    pub fn list_components(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .circuit_breakers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Snapshots of every breaker, ordered by dependency name
    pub fn snapshots(&self) -> Vec<CircuitBreakerMetrics> {
        let mut snapshots: Vec<CircuitBreakerMetrics> = self
            .circuit_breakers
            .iter()
            .map(|entry| entry.value().metrics())
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}
