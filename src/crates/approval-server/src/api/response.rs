//! API response helpers
//!
//! Every endpoint answers with the same envelope:
//!
//! ```json
//! { "success": true,  "data": { ... } }
//! { "success": false, "error": "NotFound", "message": "...", "code": "NOT_FOUND" }
//! ```

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

/// Generic success response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    /// Whether the request was successful
    pub success: bool,
    /// Response data
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    /// Create a new success response
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Create a 200 OK JSON response
pub fn ok<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(SuccessResponse::new(data)))
}

/// Create a 201 Created JSON response
pub fn created<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::CREATED, Json(SuccessResponse::new(data)))
}

/// Generic error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Whether the request was successful (always false for errors)
    pub success: bool,
    /// Error type
    pub error: String,
    /// Error message
    pub message: String,
    /// Error code for programmatic handling
    pub code: String,
    /// Seconds until the request may be retried
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(error: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            message: message.into(),
            code: code.into(),
            retry_after_seconds: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct TestData {
        id: u32,
        name: String,
    }

    #[test]
    fn test_success_response() {
        let data = TestData {
            id: 1,
            name: "test".to_string(),
        };
        let resp = SuccessResponse::new(data);
        assert!(resp.success);
        assert_eq!(resp.data.id, 1);
    }

    #[test]
    fn test_error_response_omits_empty_retry() {
        let value = serde_json::to_value(ErrorResponse::new("NotFound", "missing", "NOT_FOUND")).unwrap();
        assert_eq!(value["success"], json!(false));
        assert!(value.get("retry_after_seconds").is_none());
    }
}
