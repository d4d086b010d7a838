//! # Health Check Handlers
//!
//! Probe endpoints for load balancers and orchestrators, plus the
//! Prometheus scrape endpoint.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::web::errors::{ApiError, ApiResult};
use crate::web::responses::{HealthResponse, LivenessResponse, ReadinessResponse};
use crate::web::state::AppState;

/// Seconds a load balancer should wait before re-probing an unready instance
const NOT_READY_RETRY_SECONDS: u64 = 5;

/// Basic health check endpoint: GET /health
///
/// Always healthy while the process serves requests; touches no dependency.
pub async fn basic_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service.name.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness probe: GET /ready
///
/// Ready when the persistence gateway answers. Cache and circuit states are
/// reported but never make the service unready, since both degrade.
pub async fn readiness_probe(State(state): State<AppState>) -> ApiResult<Json<ReadinessResponse>> {
    debug!("Performing readiness probe");

    let mut dependencies = BTreeMap::new();

    let database_ok = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, backend = state.store.backend_name(), "Database readiness check failed");
            false
        }
    };
    dependencies.insert(
        "database".to_string(),
        if database_ok { "healthy" } else { "unhealthy" }.to_string(),
    );

    let cache_status = if !state.cache.is_enabled() {
        "disabled"
    } else if matches!(state.cache.ping().await, Ok(true)) {
        "healthy"
    } else {
        "degraded"
    };
    dependencies.insert("cache".to_string(), cache_status.to_string());

    for snapshot in state.circuit_breakers.snapshots() {
        dependencies.insert(
            format!("circuit:{}", snapshot.name),
            snapshot.current_state.as_str().to_string(),
        );
    }

    if !database_ok {
        return Err(ApiError::service_unavailable(
            "Database is unavailable",
            NOT_READY_RETRY_SECONDS,
        ));
    }

    Ok(Json(ReadinessResponse {
        status: "ready".to_string(),
        service: state.config.service.name.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        dependencies,
    }))
}

/// Liveness probe: GET /live
pub async fn liveness_probe(State(state): State<AppState>) -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// Prometheus metrics endpoint: GET /metrics
pub async fn prometheus_metrics(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let body = state.metrics.render()?;
    Ok(([(header::CONTENT_TYPE, state.metrics.content_type())], body))
}
