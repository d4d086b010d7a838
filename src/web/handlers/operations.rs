//! Single operations recorded on behalf of the authenticated caller.
//!
//! The caller's listing is cached under `user_ops:{id}` and invalidated
//! whenever that caller records a new operation. Listing fills are dropped
//! when an invalidation lands while the store read is in flight.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::web::errors::{ApiError, ApiResult};
use crate::web::extractors::{AuthenticatedUser, JsonBody};
use crate::web::responses::{EntityView, OperationCreatedResponse, OperationsResponse};
use crate::web::state::AppState;

pub const OPERATION_ENTITY: &str = "operation";

#[derive(Debug, Deserialize)]
pub struct CreateOperationRequest {
    #[serde(rename = "type", default)]
    pub operation_type: Option<String>,
    #[serde(default)]
    pub data: Value,
}

pub fn user_operations_cache_key(user_id: &str) -> String {
    format!("user_ops:{user_id}")
}

/// POST /api/v1/operations
pub async fn create_operation(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    JsonBody(request): JsonBody<CreateOperationRequest>,
) -> ApiResult<(StatusCode, Json<OperationCreatedResponse>)> {
    if !(request.data.is_object() || request.data.is_null()) {
        return Err(ApiError::validation("data must be a JSON object"));
    }

    let payload = json!({
        "user_id": identity.id,
        "type": request.operation_type.unwrap_or_else(|| "generic".to_string()),
        "data": request.data,
        "status": "completed",
    });

    let mut tx = state.store.begin().await?;
    let record = match tx.create(OPERATION_ENTITY, payload).await {
        Ok(record) => record,
        Err(e) => {
            if let Err(rollback_error) = tx.rollback().await {
                tracing::error!(error = %rollback_error, "Rollback after failed operation insert failed");
            }
            return Err(e.into());
        }
    };
    tx.commit().await?;

    state
        .cache
        .invalidate(&user_operations_cache_key(&identity.id))
        .await;

    info!(operation_id = %record.id, user_id = %identity.id, "Recorded operation");

    Ok((
        StatusCode::CREATED,
        Json(OperationCreatedResponse {
            id: record.id,
            status: "completed".to_string(),
        }),
    ))
}

/// GET /api/v1/user/operations
pub async fn list_user_operations(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
) -> ApiResult<Json<OperationsResponse>> {
    let cache_key = user_operations_cache_key(&identity.id);
    if let Some(operations) = state.cache.get_json::<Vec<EntityView>>(&cache_key).await {
        return Ok(Json(OperationsResponse { operations }));
    }

    let generation = state.cache.generation(&cache_key);
    let operations: Vec<EntityView> = state
        .store
        .list_where(OPERATION_ENTITY, "user_id", &identity.id)
        .await?
        .into_iter()
        .map(EntityView::from)
        .collect();

    state
        .cache
        .set_json_if_current(&cache_key, &operations, generation)
        .await;

    Ok(Json(OperationsResponse { operations }))
}
