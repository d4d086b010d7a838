//! Circuit breaker snapshots

use axum::extract::State;
use axum::Json;

use crate::web::responses::CircuitsResponse;
use crate::web::state::AppState;

/// GET /api/v1/circuits
pub async fn list_circuits(State(state): State<AppState>) -> Json<CircuitsResponse> {
    Json(CircuitsResponse {
        circuits: state.circuit_breakers.snapshots(),
    })
}
