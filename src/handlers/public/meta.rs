use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::database::Store;
use crate::middleware::ApiResponse;
use crate::state::AppState;

/// GET / - service banner
pub async fn root() -> impl IntoResponse {
    ApiResponse::success(json!({
        "name": "speak-api",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Speech-therapy exercises with encrypted recording uploads",
    }))
}

/// GET /health - 200 when the store answers, 503 otherwise
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true, "data": { "status": "ok", "database": "ok" } }))),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "success": false, "error": "database unavailable", "code": "SERVICE_UNAVAILABLE" })),
            )
        }
    }
}
