//! Request validation utilities
//!
//! Parsing helpers that turn raw request fields into typed values or a 400.

use hitl_checkpoint::{Decision, RunId};

use crate::api::error::{ApiError, ApiResult};

/// Validate that a required string field is present and not blank
pub fn validate_not_empty<'a>(value: Option<&'a str>, field_name: &str) -> ApiResult<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::ValidationError(format!("{} is required", field_name))),
    }
}

/// Validate UUID format
pub fn validate_uuid(value: &str) -> ApiResult<RunId> {
    uuid::Uuid::parse_str(value.trim())
        .map_err(|_| ApiError::ValidationError(format!("Invalid UUID: {}", value)))
}

/// Parse a decision action (`approve` / `reject`)
pub fn validate_action(value: &str) -> ApiResult<Decision> {
    value.parse::<Decision>().map_err(|_| {
        ApiError::ValidationError(format!(
            "Invalid action: {:?} (expected approve or reject)",
            value
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_empty() {
        assert_eq!(validate_not_empty(Some(" tok "), "token").unwrap(), "tok");
        assert!(validate_not_empty(Some("   "), "token").is_err());
        assert!(validate_not_empty(None, "token").is_err());
    }

    #[test]
    fn test_validate_uuid_valid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
    }

    #[test]
    fn test_validate_uuid_invalid() {
        let err = validate_uuid("not-a-uuid").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_validate_action() {
        assert_eq!(validate_action("Approve").unwrap(), Decision::Approve);
        assert_eq!(validate_action("rejected").unwrap(), Decision::Reject);
        assert!(validate_action("defer").is_err());
    }
}
