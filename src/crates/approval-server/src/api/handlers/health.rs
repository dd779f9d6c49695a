//! Health check endpoint handler

use axum::extract::State;

use crate::api::{models::HealthResponse, response, routes::AppState};

/// Handler for GET /health
///
/// Liveness only; storage is not probed.
pub async fn health(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    response::ok(HealthResponse::new("ok", state.storage_backend))
}
