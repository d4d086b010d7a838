//! Calls to the external dependency, guarded by its circuit breaker

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde_json::Value;
use tracing::warn;

use crate::resilience::CircuitBreakerError;
use crate::web::errors::{ApiError, ApiResult};
use crate::web::responses::ExternalCallResponse;
use crate::web::state::AppState;

/// Retry hint after a failed (not short-circuited) downstream call
const DOWNSTREAM_FAILURE_RETRY_SECONDS: u64 = 1;

/// POST /api/v1/external/failing-service
///
/// The body is optional; when present it is forwarded to the dependency.
pub async fn call_external_service(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<ExternalCallResponse>> {
    let payload: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(&body)
            .map_err(|_| ApiError::validation("Request body is not valid JSON"))?
    };

    let service = state.external.name().to_string();
    let breaker = state.circuit_breakers.get_circuit_breaker(&service);

    match breaker.call(|| state.external.invoke(&payload)).await {
        Ok(result) => Ok(Json(ExternalCallResponse {
            status: "ok".to_string(),
            service,
            result,
        })),
        Err(CircuitBreakerError::CircuitOpen {
            retry_after_seconds,
            ..
        }) => Err(ApiError::service_unavailable(
            format!("Circuit breaker is open for {service}"),
            retry_after_seconds,
        )),
        Err(CircuitBreakerError::OperationFailed(e)) => {
            warn!(service = %service, error = %e, "External dependency call failed");
            Err(ApiError::service_unavailable(
                format!("{service} failed to respond"),
                DOWNSTREAM_FAILURE_RETRY_SECONDS,
            ))
        }
        Err(CircuitBreakerError::Timeout { timeout_ms, .. }) => {
            warn!(service = %service, timeout_ms, "External dependency call timed out");
            Err(ApiError::service_unavailable(
                format!("{service} timed out"),
                DOWNSTREAM_FAILURE_RETRY_SECONDS,
            ))
        }
    }
}
