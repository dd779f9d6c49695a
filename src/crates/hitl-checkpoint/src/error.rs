//! Error types for checkpoint and token registry operations

use thiserror::Error;

use crate::checkpoint::{RunId, RunStatus, Stage};

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Checkpoint not found
    #[error("Checkpoint not found: {0}")]
    NotFound(RunId),

    /// Checkpoint already exists
    #[error("Checkpoint already exists: {0}")]
    AlreadyExists(RunId),

    /// Compare-and-swap save lost against a concurrent writer
    #[error("Version conflict on {run_id}: expected {expected}, found {found}")]
    VersionConflict {
        run_id: RunId,
        expected: u64,
        found: u64,
    },

    /// Decision already recorded for the stage
    #[error("Decision already recorded for {stage} on run {run_id}")]
    AlreadyDecided { run_id: RunId, stage: Stage },

    /// Lifecycle transition not allowed
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid checkpoint or registry entry
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckpointError {
    /// Whether the error comes from the storage layer rather than the caller
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            CheckpointError::Storage(_) | CheckpointError::Io(_) | CheckpointError::Serialization(_)
        )
    }
}
