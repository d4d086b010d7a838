//! # External Dependencies
//!
//! Downstream services reached through a circuit breaker. The service ships
//! with [`SimulatedDependency`], whose failure behaviour is configured, so the
//! breaker can be exercised end to end.

use crate::config::{ExternalConfig, ExternalFailureMode};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExternalServiceError {
    #[error("{service} is unavailable: {reason}")]
    Unavailable { service: String, reason: String },
}

#[async_trait]
pub trait ExternalService: Send + Sync + std::fmt::Debug {
    /// Dependency key used for the circuit breaker and metrics labels
    fn name(&self) -> &str;

    async fn invoke(&self, payload: &Value) -> Result<Value, ExternalServiceError>;
}

#[derive(Debug, Clone)]
pub struct SimulatedDependency {
    name: String,
    failure_mode: ExternalFailureMode,
    latency: Duration,
}

impl SimulatedDependency {
    pub fn new(name: impl Into<String>, failure_mode: ExternalFailureMode, latency: Duration) -> Self {
        Self {
            name: name.into(),
            failure_mode,
            latency,
        }
    }

    pub fn from_config(name: impl Into<String>, config: &ExternalConfig) -> Self {
        Self::new(
            name,
            config.failure_mode,
            Duration::from_millis(config.simulated_latency_ms),
        )
    }

    fn should_fail(&self, payload: &Value) -> bool {
        match self.failure_mode {
            ExternalFailureMode::AlwaysFail => true,
            ExternalFailureMode::NeverFail => false,
            ExternalFailureMode::PayloadDriven => payload
                .get("fail")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}

#[async_trait]
impl ExternalService for SimulatedDependency {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, payload: &Value) -> Result<Value, ExternalServiceError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.should_fail(payload) {
            debug!(service = %self.name, "Simulated dependency failure");
            return Err(ExternalServiceError::Unavailable {
                service: self.name.clone(),
                reason: "simulated failure".to_string(),
            });
        }

        Ok(json!({
            "service": self.name,
            "status": "ok",
            "echo": payload,
        }))
    }
}
