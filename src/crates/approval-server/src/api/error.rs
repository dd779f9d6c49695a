//! API error types and HTTP response conversion
//!
//! Provides the API error type with conversion to Axum HTTP responses.
//! Service errors map onto HTTP status codes here and nowhere else.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::api::response::ErrorResponse;
use crate::services::ApprovalError;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// Custom API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unknown or superseded decision token
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Invalid request data
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Validation error
    #[error("Validation failed: {0}")]
    ValidationError(String),

    /// Token presented at the endpoint of the other stage
    #[error("Wrong stage: {0}")]
    WrongStage(String),

    /// Run is decided or no longer paused
    #[error("Not awaiting decision: {0}")]
    NotAwaitingDecision(String),

    /// Conflict (e.g., duplicate resource)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limited; retry after the given number of seconds
    #[error("Too many requests: {message}")]
    TooManyRequests {
        message: String,
        retry_after_seconds: u64,
    },

    /// Internal server error
    #[error("Internal server error: {0}")]
    InternalError(String),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    JsonError(String),
}

impl ApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) | ApiError::InvalidToken(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_)
            | ApiError::ValidationError(_)
            | ApiError::WrongStage(_)
            | ApiError::NotAwaitingDecision(_)
            | ApiError::JsonError(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code identifier
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::InvalidToken(_) => "INVALID_TOKEN",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::WrongStage(_) => "WRONG_STAGE",
            ApiError::NotAwaitingDecision(_) => "NOT_AWAITING_DECISION",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::TooManyRequests { .. } => "COOLDOWN_ACTIVE",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::JsonError(_) => "JSON_ERROR",
        }
    }

    /// Get the error type name
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFound",
            ApiError::InvalidToken(_) => "InvalidToken",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::ValidationError(_) => "ValidationError",
            ApiError::WrongStage(_) => "WrongStage",
            ApiError::NotAwaitingDecision(_) => "NotAwaitingDecision",
            ApiError::Conflict(_) => "Conflict",
            ApiError::TooManyRequests { .. } => "TooManyRequests",
            ApiError::InternalError(_) => "InternalError",
            ApiError::JsonError(_) => "JsonError",
        }
    }

    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            ApiError::TooManyRequests {
                retry_after_seconds,
                ..
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = ErrorResponse::new(self.error_type(), self.to_string(), self.code());
        body.retry_after_seconds = self.retry_after_seconds();

        if status.is_server_error() {
            tracing::error!("API Error: {:?}", body);
        } else {
            tracing::warn!("API Error: {:?}", body);
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(seconds) = self.retry_after_seconds() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::JsonError(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::JsonError(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<ApprovalError> for ApiError {
    fn from(err: ApprovalError) -> Self {
        let message = err.to_string();
        match err {
            ApprovalError::InvalidToken => ApiError::InvalidToken(message),
            ApprovalError::WrongStage { .. } => ApiError::WrongStage(message),
            ApprovalError::NotFound(_) => ApiError::NotFound(message),
            ApprovalError::AlreadyExists(_) => ApiError::Conflict(message),
            ApprovalError::Validation(_) => ApiError::ValidationError(message),
            ApprovalError::NotAwaitingDecision { .. } => ApiError::NotAwaitingDecision(message),
            ApprovalError::CooldownActive {
                retry_after_seconds,
            } => ApiError::TooManyRequests {
                message,
                retry_after_seconds,
            },
            ApprovalError::Persistence(_) => ApiError::InternalError(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitl_checkpoint::{CheckpointError, Stage};
    use uuid::Uuid;

    #[test]
    fn test_not_found_error() {
        let err = ApiError::NotFound("resource".to_string());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(err.error_type(), "NotFound");
    }

    #[test]
    fn test_validation_error_is_bad_request() {
        let err = ApiError::ValidationError("reason too short".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_wrong_stage_is_distinguishable() {
        let err = ApiError::from(ApprovalError::WrongStage {
            expected: Stage::Edd,
            actual: Stage::Stage1,
        });
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "WRONG_STAGE");
    }

    #[test]
    fn test_cooldown_maps_to_429_with_header() {
        let err = ApiError::from(ApprovalError::CooldownActive {
            retry_after_seconds: 42,
        });
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.retry_after_seconds(), Some(42));

        let response = err.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }

    #[test]
    fn test_service_error_mapping() {
        let run_id = Uuid::new_v4();
        assert_eq!(
            ApiError::from(ApprovalError::InvalidToken).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(ApprovalError::AlreadyExists(run_id)).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(ApprovalError::NotAwaitingDecision { run_id }).code(),
            "NOT_AWAITING_DECISION"
        );
        assert_eq!(
            ApiError::from(ApprovalError::Persistence(CheckpointError::Storage("disk".into())))
                .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
