//! API data transfer objects (DTOs) and response models
//!
//! Provides request/response structures for API endpoints with validation.
//! Service result types (`StatusView`, `DecisionResult`, ...) serialize
//! directly and are not wrapped again here.

pub mod approval;

pub use approval::{PollQuery, RemindRequest, SubmitRequest};

/// Liveness response
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    /// Overall status
    pub status: String,

    /// Storage backend in use
    pub storage: String,

    /// API version
    pub version: String,

    /// Current timestamp
    pub timestamp: String,
}

impl HealthResponse {
    /// Create a new health response
    pub fn new(status: impl Into<String>, storage: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            storage: storage.into(),
            version: crate::version::VERSION.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response() {
        let health = HealthResponse::new("ok", "memory");
        assert_eq!(health.status, "ok");
        assert_eq!(health.storage, "memory");
        assert!(!health.version.is_empty());
        assert!(!health.timestamp.is_empty());
    }
}
