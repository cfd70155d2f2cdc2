//! Health and origin endpoints.

use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use tagindex_client::wire::HealthResponse;

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /origin
pub async fn get_origin(State(state): State<AppState>) -> String {
    state.tags.origin().to_string()
}
