//! Extensible checkpoint storage trait for custom backend implementations
//!
//! This module defines the **[`CheckpointStore`]** trait - the persistence seam
//! for paused approval runs - and **[`CheckpointPatch`]**, the typed set of
//! partial updates accepted by [`CheckpointStore::patch`].
//!
//! # Contract
//!
//! | Operation | Result |
//! |-----------|--------|
//! | `load(run_id)` | `Some(checkpoint)` or `None` |
//! | `save(checkpoint)` | stored record with `version + 1`, or `VersionConflict` |
//! | `patch(run_id, patch)` | stored record, `NotFound`, or storage error |
//!
//! Stores perform **no schema validation** and **no business logic**: the
//! decision finalizer and reminder scheduler decide what to write, the store
//! only guarantees that a write is all-or-nothing and that stale writes are
//! refused.
//!
//! # Compare-and-swap
//!
//! ```text
//!   writer A                 store (version 4)             writer B
//!   load ──────────────────▶  v4  ◀──────────────────────── load
//!   save(v4) ──────────────▶  v5
//!                              v5  ◀──────────────────────── save(v4)
//!                                   VersionConflict{4, 5} ──▶ reload, re-check
//! ```
//!
//! Writers that lose the race reload and re-evaluate. For decisions this
//! lands in the idempotency check; for reminders it sees the flag already set
//! and does not send.
//!
//! # Atomicity
//!
//! Implementations must make `save` atomic with respect to crashes: readers
//! observe either the previous record or the new one, never a torn write.
//! [`FileCheckpointStore`](crate::file::FileCheckpointStore) writes a temp
//! file, fsyncs it, and renames it over the target.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    checkpoint::{Checkpoint, RunId, RunStatus},
    error::{CheckpointError, Result},
};

/// Bound on reload-and-retry loops after a [`CheckpointError::VersionConflict`]
pub const MAX_CAS_ATTEMPTS: usize = 5;

/// Partial update applied by [`CheckpointStore::patch`]
///
/// Decision fields are deliberately absent: they are write-once and only the
/// decision finalizer sets them, through a compare-and-swap `save`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckpointPatch {
    pub status: Option<RunStatus>,
    pub approval_email_to: Option<String>,
    pub approval_email_sent: Option<bool>,
    pub approval_sent_at: Option<DateTime<Utc>>,
    pub reminder_due_at: Option<DateTime<Utc>>,
    pub reminder_email_sent: Option<bool>,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub documents: Option<Value>,
    pub graph_state: Option<Value>,
    pub topic_summaries: Option<Value>,
    pub issues: Option<Value>,
    pub checkpoint_metadata: Option<Value>,
}

impl CheckpointPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_reminder_sent(mut self, sent_at: DateTime<Utc>) -> Self {
        self.reminder_email_sent = Some(true);
        self.reminder_sent_at = Some(sent_at);
        self
    }

    pub fn with_graph_state(mut self, graph_state: Value) -> Self {
        self.graph_state = Some(graph_state);
        self
    }

    /// Whether applying the patch would change nothing
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply the patch in place
    ///
    /// A status change follows the lifecycle rules of the checkpoint
    /// (`paused` may move once; terminal states never move).
    pub fn apply(&self, checkpoint: &mut Checkpoint, now: DateTime<Utc>) -> Result<()> {
        if let Some(status) = self.status {
            if status != checkpoint.status {
                if checkpoint.status != RunStatus::Paused {
                    return Err(CheckpointError::InvalidTransition {
                        from: checkpoint.status,
                        to: status,
                    });
                }
                checkpoint.status = status;
            }
        }
        if let Some(to) = &self.approval_email_to {
            checkpoint.approval_email_to = Some(to.clone());
        }
        if let Some(sent) = self.approval_email_sent {
            checkpoint.approval_email_sent = sent;
        }
        if let Some(at) = self.approval_sent_at {
            checkpoint.approval_sent_at = Some(at);
        }
        if let Some(at) = self.reminder_due_at {
            checkpoint.reminder_due_at = Some(at);
        }
        if let Some(sent) = self.reminder_email_sent {
            checkpoint.reminder_email_sent = sent;
        }
        if let Some(at) = self.reminder_sent_at {
            checkpoint.reminder_sent_at = Some(at);
        }
        if let Some(value) = &self.documents {
            checkpoint.documents = value.clone();
        }
        if let Some(value) = &self.graph_state {
            checkpoint.graph_state = value.clone();
        }
        if let Some(value) = &self.topic_summaries {
            checkpoint.topic_summaries = value.clone();
        }
        if let Some(value) = &self.issues {
            checkpoint.issues = value.clone();
        }
        if let Some(value) = &self.checkpoint_metadata {
            checkpoint.checkpoint_metadata = value.clone();
        }
        checkpoint.updated_at = now;
        Ok(())
    }
}

/// Core trait for implementing checkpoint storage backends
///
/// ## Required Methods
///
/// - `load` - Read a record by run id
/// - `save` - Compare-and-swap write of a full record
///
/// `get`, `create` and `patch` have default implementations on top of these.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; the HTTP layer shares one store
/// across all requests.
///
/// ## Example: Custom Backend
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use hitl_checkpoint::{Checkpoint, CheckpointError, CheckpointStore, Result, RunId};
///
/// struct PostgresCheckpointStore {
///     pool: sqlx::PgPool,
/// }
///
/// #[async_trait]
/// impl CheckpointStore for PostgresCheckpointStore {
///     async fn load(&self, run_id: &RunId) -> Result<Option<Checkpoint>> {
///         // SELECT document FROM checkpoints WHERE run_id = $1
///         Ok(None)
///     }
///
///     async fn save(&self, checkpoint: Checkpoint) -> Result<Checkpoint> {
///         // UPDATE checkpoints SET document = $2, version = version + 1
///         //  WHERE run_id = $1 AND version = $3
///         // zero rows updated => CheckpointError::VersionConflict
///         Ok(checkpoint)
///     }
/// }
/// ```
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint for `run_id`
    ///
    /// # Returns
    ///
    /// - `Ok(Some(checkpoint))` - record found
    /// - `Ok(None)` - no record for this run
    /// - `Err` - storage error (unreadable or corrupt record)
    async fn load(&self, run_id: &RunId) -> Result<Option<Checkpoint>>;

    /// Save a full record with compare-and-swap on `version`
    ///
    /// The incoming record's `version` must equal the stored version, or be
    /// `0` when no record exists. On success the stored record (with
    /// `version + 1`) is returned. On mismatch nothing is written and
    /// [`CheckpointError::VersionConflict`] is returned.
    async fn save(&self, checkpoint: Checkpoint) -> Result<Checkpoint>;

    /// Load the checkpoint for `run_id`, failing with `NotFound` when absent
    async fn get(&self, run_id: &RunId) -> Result<Checkpoint> {
        self.load(run_id)
            .await?
            .ok_or(CheckpointError::NotFound(*run_id))
    }

    /// Store a brand-new record
    ///
    /// Fails with [`CheckpointError::AlreadyExists`] when the run id is taken.
    async fn create(&self, checkpoint: Checkpoint) -> Result<Checkpoint> {
        if checkpoint.version != 0 {
            return Err(CheckpointError::Invalid(format!(
                "new checkpoint {} must have version 0, got {}",
                checkpoint.run_id, checkpoint.version
            )));
        }
        let run_id = checkpoint.run_id;
        match self.save(checkpoint).await {
            Err(CheckpointError::VersionConflict { .. }) => Err(CheckpointError::AlreadyExists(run_id)),
            other => other,
        }
    }

    /// Apply a partial update
    ///
    /// Reloads and retries on version conflicts, so concurrent patches of
    /// different fields both land (last write wins per field).
    async fn patch(&self, run_id: &RunId, patch: CheckpointPatch) -> Result<Checkpoint> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let mut checkpoint = self.get(run_id).await?;
            patch.apply(&mut checkpoint, Utc::now())?;
            match self.save(checkpoint).await {
                Err(CheckpointError::VersionConflict { .. }) => continue,
                other => return other,
            }
        }
        Err(CheckpointError::Storage(format!(
            "patch of {} gave up after {} conflicting writes",
            run_id, MAX_CAS_ATTEMPTS
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_empty_patch() {
        assert!(CheckpointPatch::new().is_empty());
        assert!(!CheckpointPatch::new().with_status(RunStatus::Failed).is_empty());
    }

    #[test]
    fn test_apply_sets_only_given_fields() {
        let now = Utc::now();
        let mut checkpoint = Checkpoint::paused(Uuid::new_v4(), now)
            .with_payload(json!([1]), json!({"a": 1}), json!(null), json!(null), json!({"k": "v"}));

        CheckpointPatch::new()
            .with_reminder_sent(now)
            .with_graph_state(json!({"a": 2}))
            .apply(&mut checkpoint, now)
            .unwrap();

        assert!(checkpoint.reminder_email_sent);
        assert_eq!(checkpoint.reminder_sent_at, Some(now));
        assert_eq!(checkpoint.graph_state, json!({"a": 2}));
        assert_eq!(checkpoint.documents, json!([1]));
        assert_eq!(checkpoint.checkpoint_metadata, json!({"k": "v"}));
    }

    #[test]
    fn test_apply_refuses_terminal_transition() {
        let now = Utc::now();
        let mut checkpoint = Checkpoint::paused(Uuid::new_v4(), now);
        CheckpointPatch::new()
            .with_status(RunStatus::Failed)
            .apply(&mut checkpoint, now)
            .unwrap();

        let err = CheckpointPatch::new()
            .with_status(RunStatus::Paused)
            .apply(&mut checkpoint, now)
            .unwrap_err();
        assert!(matches!(err, CheckpointError::InvalidTransition { .. }));
    }
}
