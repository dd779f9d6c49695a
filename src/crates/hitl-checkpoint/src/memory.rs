//! In-memory checkpoint storage for development and testing
//!
//! This module provides **[`InMemoryCheckpointStore`]** - a reference
//! implementation of the [`CheckpointStore`] trait that keeps every record in
//! a thread-safe `HashMap`. It honors the same compare-and-swap contract as
//! the file backend, which makes it the store of choice for unit tests of the
//! decision and reminder logic.
//!
//! # When to Use
//!
//! **Use In-Memory Checkpoints For:**
//! - ✅ Unit and integration tests
//! - ✅ Local development of the UI against a throwaway server
//!
//! **Avoid In-Memory For:**
//! - ❌ Anything that must survive a restart (pending approvals are lost)
//! - ❌ Multi-process deployments
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  InMemoryCheckpointStore                     │
//! │  Arc<RwLock<HashMap<RunId, Checkpoint>>>     │
//! │    • run_id → latest stored record           │
//! │    • save() checks version under write lock  │
//! └──────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    checkpoint::{Checkpoint, RunId},
    error::{CheckpointError, Result},
    traits::CheckpointStore,
};

type CheckpointStorage = Arc<RwLock<HashMap<RunId, Checkpoint>>>;

/// In-memory checkpoint store
///
/// Cloning shares the underlying map.
///
/// # Example
///
/// ```rust
/// use hitl_checkpoint::{Checkpoint, CheckpointStore, InMemoryCheckpointStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryCheckpointStore::new();
///     let checkpoint = Checkpoint::paused(uuid::Uuid::new_v4(), chrono::Utc::now());
///     let stored = store.create(checkpoint).await?;
///     assert_eq!(stored.version, 1);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    storage: CheckpointStorage,
}

impl InMemoryCheckpointStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored checkpoints
    pub async fn len(&self) -> usize {
        self.storage.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.storage.read().await.is_empty()
    }

    /// Clear all checkpoints (useful for testing)
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, run_id: &RunId) -> Result<Option<Checkpoint>> {
        Ok(self.storage.read().await.get(run_id).cloned())
    }

    async fn save(&self, mut checkpoint: Checkpoint) -> Result<Checkpoint> {
        let mut storage = self.storage.write().await;

        let found = storage.get(&checkpoint.run_id).map(|c| c.version).unwrap_or(0);
        if found != checkpoint.version {
            return Err(CheckpointError::VersionConflict {
                run_id: checkpoint.run_id,
                expected: checkpoint.version,
                found,
            });
        }

        checkpoint.version += 1;
        storage.insert(checkpoint.run_id, checkpoint.clone());
        Ok(checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::RunStatus;
    use crate::traits::CheckpointPatch;
    use chrono::Utc;
    use uuid::Uuid;

    fn checkpoint() -> Checkpoint {
        Checkpoint::paused(Uuid::new_v4(), Utc::now()).with_approval_token("tok")
    }

    #[tokio::test]
    async fn test_save_and_load_checkpoint() {
        let store = InMemoryCheckpointStore::new();
        let checkpoint = checkpoint();
        let run_id = checkpoint.run_id;

        let stored = store.save(checkpoint).await.unwrap();
        assert_eq!(stored.version, 1);

        let loaded = store.load(&run_id).await.unwrap().unwrap();
        assert_eq!(loaded, stored);
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let store = InMemoryCheckpointStore::new();
        assert!(store.load(&Uuid::new_v4()).await.unwrap().is_none());
        assert!(matches!(
            store.get(&Uuid::new_v4()).await,
            Err(CheckpointError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stale_save_is_refused() {
        let store = InMemoryCheckpointStore::new();
        let stored = store.create(checkpoint()).await.unwrap();

        let mut first = stored.clone();
        first.reminder_email_sent = true;
        store.save(first).await.unwrap();

        let mut stale = stored;
        stale.graph_state = serde_json::json!({"overwrite": true});
        let err = store.save(stale).await.unwrap_err();
        assert!(matches!(
            err,
            CheckpointError::VersionConflict {
                expected: 1,
                found: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let store = InMemoryCheckpointStore::new();
        let checkpoint = checkpoint();
        store.create(checkpoint.clone()).await.unwrap();

        let err = store.create(checkpoint).await.unwrap_err();
        assert!(matches!(err, CheckpointError::AlreadyExists(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_patch_missing_is_not_found() {
        let store = InMemoryCheckpointStore::new();
        let err = store
            .patch(&Uuid::new_v4(), CheckpointPatch::new().with_status(RunStatus::Failed))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_patch_bumps_version() {
        let store = InMemoryCheckpointStore::new();
        let stored = store.create(checkpoint()).await.unwrap();

        let patched = store
            .patch(&stored.run_id, CheckpointPatch::new().with_status(RunStatus::Failed))
            .await
            .unwrap();
        assert_eq!(patched.version, 2);
        assert_eq!(patched.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = InMemoryCheckpointStore::new();
        store.create(checkpoint()).await.unwrap();
        assert_eq!(store.len().await, 1);

        store.clear().await;
        assert!(store.is_empty().await);
    }
}
