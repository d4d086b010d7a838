//! Atomic multi-entity batches

use axum::extract::State;
use axum::Json;
use tracing::info;

use crate::batch::{BatchRequest, BatchResult};
use crate::web::errors::{ApiError, ApiResult};
use crate::web::extractors::{AuthenticatedUser, JsonBody};
use crate::web::state::AppState;

/// POST /api/v1/batch-operations
///
/// 200 with the committed count, or 400 `Transaction Failed` with
/// `operations_completed: 0` after rollback.
pub async fn execute_batch(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    JsonBody(request): JsonBody<BatchRequest>,
) -> ApiResult<Json<BatchResult>> {
    state.batch_processor.validate(&request.operations)?;

    info!(
        user_id = %identity.id,
        operations = request.operations.len(),
        "Executing batch"
    );

    let result = state
        .batch_processor
        .execute_detached(request.operations)
        .await;

    if result.success {
        Ok(Json(result))
    } else {
        Err(ApiError::transaction_failed(
            result
                .error
                .unwrap_or_else(|| "batch was rolled back".to_string()),
        ))
    }
}
