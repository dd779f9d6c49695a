//! REST API Layer for the approval server
//!
//! Provides HTTP endpoints for:
//! - Opening checkpoints for paused runs
//! - Polling approval status (with lazy reminders)
//! - Manual reminders
//! - Stage-1 and EDD decision submission
//! - Liveness

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod response;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use response::{ErrorResponse, SuccessResponse};
pub use routes::{create_router, AppState};
