//! API route definitions
//!
//! Defines all API routes and their associated handler functions.

use axum::{
    routing::{get, post},
    Router,
};

use crate::api::{handlers, middleware};
use crate::services::ApprovalService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub approvals: ApprovalService,
    /// Reported by the health endpoint
    pub storage_backend: &'static str,
}

impl AppState {
    pub fn new(approvals: ApprovalService, storage_backend: &'static str) -> Self {
        Self {
            approvals,
            storage_backend,
        }
    }
}

/// Build the complete API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(handlers::health))
        // Checkpoint creation (analysis engine)
        .route("/approvals/checkpoints", post(handlers::create_checkpoint))
        // Status and reminders (UI)
        .route("/approvals/poll", get(handlers::poll))
        .route("/approvals/remind", post(handlers::remind))
        // Stage-1 decisions
        .route(
            "/approvals/submit",
            get(handlers::approvals::submit_link).post(handlers::approvals::submit_form),
        )
        // EDD decisions
        .route(
            "/edd/submit",
            get(handlers::edd::submit_link).post(handlers::edd::submit_form),
        )
        .layer(middleware::cors_layer())
        .layer(middleware::logging_layer())
        .with_state(state)
}
