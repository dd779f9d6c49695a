//! Approval service errors

use hitl_checkpoint::{CheckpointError, RunId, Stage};
use thiserror::Error;

/// Errors returned by the approval services
///
/// Notification failures are not errors here: once state is committed they
/// travel as a `notification_warning` on the successful result.
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// Unknown token, or a token that is no longer the one recorded for its stage
    #[error("Invalid or expired decision token")]
    InvalidToken,

    /// Token is valid but belongs to the other stage
    #[error("Token belongs to the {actual} stage, this endpoint serves {expected}")]
    WrongStage { expected: Stage, actual: Stage },

    #[error("Checkpoint not found: {0}")]
    NotFound(RunId),

    #[error("Checkpoint already exists: {0}")]
    AlreadyExists(RunId),

    #[error("{0}")]
    Validation(String),

    /// The run is not in a state that accepts this operation
    #[error("Run {run_id} is not awaiting a decision")]
    NotAwaitingDecision { run_id: RunId },

    #[error("Reminder cooldown active, retry in {retry_after_seconds}s")]
    CooldownActive { retry_after_seconds: u64 },

    #[error("Persistence failed: {0}")]
    Persistence(#[source] CheckpointError),
}

impl From<CheckpointError> for ApprovalError {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::NotFound(run_id) => ApprovalError::NotFound(run_id),
            CheckpointError::AlreadyExists(run_id) => ApprovalError::AlreadyExists(run_id),
            other => ApprovalError::Persistence(other),
        }
    }
}

pub type ApprovalResult<T> = std::result::Result<T, ApprovalError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_store_errors_map_to_service_errors() {
        let run_id = Uuid::new_v4();
        assert!(matches!(
            ApprovalError::from(CheckpointError::NotFound(run_id)),
            ApprovalError::NotFound(id) if id == run_id
        ));
        assert!(matches!(
            ApprovalError::from(CheckpointError::Storage("disk full".into())),
            ApprovalError::Persistence(_)
        ));
    }
}
