//! File-backed checkpoint storage
//!
//! [`FileCheckpointStore`] keeps one JSON document per run under
//! `<root>/<run_id>.json`. Writes go through
//! [`atomic_write`](crate::fsync::atomic_write), so a crash mid-write leaves
//! the previous document in place.
//!
//! The compare-and-swap check reads the current version and renames the new
//! document while holding a per-run async lock. That serializes writers inside
//! one process; separate processes sharing a directory only get torn-write
//! protection, not version checking.

use async_trait::async_trait;
use dashmap::DashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::{
    checkpoint::{Checkpoint, RunId},
    error::{CheckpointError, Result},
    fsync::atomic_write,
    traits::CheckpointStore,
};

/// Checkpoint store writing one JSON file per run
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
    locks: Arc<DashMap<RunId, Arc<Mutex<()>>>>,
}

impl FileCheckpointStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            locks: Arc::new(DashMap::new()),
        })
    }

    /// Directory holding the checkpoint documents
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, run_id: &RunId) -> PathBuf {
        self.root.join(format!("{}.json", run_id))
    }

    fn lock_for(&self, run_id: &RunId) -> Arc<Mutex<()>> {
        self.locks
            .entry(*run_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn read(&self, run_id: &RunId) -> Result<Option<Checkpoint>> {
        let path = self.path_for(run_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let checkpoint: Checkpoint = serde_json::from_slice(&bytes)?;
                Ok(Some(checkpoint))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CheckpointError::Io(e)),
        }
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, run_id: &RunId) -> Result<Option<Checkpoint>> {
        self.read(run_id).await
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<Checkpoint> {
        let run_id = checkpoint.run_id;
        let lock = self.lock_for(&run_id);
        let result = {
            let _guard = lock.lock().await;
            self.write_locked(checkpoint).await
        };
        drop(lock);
        // Drop the entry unless another writer already holds a handle to it
        self.locks.remove_if(&run_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }
}

impl FileCheckpointStore {
    /// Version check and write; the caller holds the run's lock
    async fn write_locked(&self, mut checkpoint: Checkpoint) -> Result<Checkpoint> {
        let found = self
            .read(&checkpoint.run_id)
            .await?
            .map(|c| c.version)
            .unwrap_or(0);
        if found != checkpoint.version {
            return Err(CheckpointError::VersionConflict {
                run_id: checkpoint.run_id,
                expected: checkpoint.version,
                found,
            });
        }

        checkpoint.version += 1;
        let bytes = serde_json::to_vec_pretty(&checkpoint)?;
        let path = self.path_for(&checkpoint.run_id);
        tokio::task::spawn_blocking(move || atomic_write(&path, &bytes))
            .await
            .map_err(|e| CheckpointError::Storage(format!("write task failed: {}", e)))??;

        tracing::debug!(
            run_id = %checkpoint.run_id,
            version = checkpoint.version,
            "Checkpoint written"
        );
        Ok(checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{Decision, DecisionRecord, EddStage};
    use crate::traits::CheckpointPatch;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::tempdir;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_round_trip_survives_reopen() {
        let dir = tempdir().unwrap();
        let run_id = Uuid::new_v4();

        {
            let store = FileCheckpointStore::open(dir.path()).unwrap();
            let mut checkpoint = Checkpoint::paused(run_id, Utc::now())
                .with_approval_token("tok")
                .with_payload(json!([]), json!({"z": 1, "a": 2}), json!(null), json!(null), json!({}));
            checkpoint
                .record_stage1_decision(
                    DecisionRecord::new(Decision::Reject, "bob", Utc::now())
                        .with_comment(Some("Reject. Route: EDD.".into())),
                )
                .unwrap();
            checkpoint
                .open_edd_stage(EddStage::waiting("edd-tok", None, Utc::now()))
                .unwrap();
            store.create(checkpoint).await.unwrap();
        }

        let reopened = FileCheckpointStore::open(dir.path()).unwrap();
        let loaded = reopened.get(&run_id).await.unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.decision, Some(Decision::Reject));
        assert!(loaded.edd_stage.is_waiting());
        assert_eq!(loaded.graph_state, json!({"z": 1, "a": 2}));
    }

    #[tokio::test]
    async fn test_stale_save_is_refused() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path()).unwrap();
        let stored = store
            .create(Checkpoint::paused(Uuid::new_v4(), Utc::now()))
            .await
            .unwrap();

        store.save(stored.clone()).await.unwrap();
        let err = store.save(stored).await.unwrap_err();
        assert!(matches!(err, CheckpointError::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn test_run_locks_are_released() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path()).unwrap();

        for _ in 0..3 {
            let stored = store
                .create(Checkpoint::paused(Uuid::new_v4(), Utc::now()))
                .await
                .unwrap();
            store.save(stored.clone()).await.unwrap();
            assert!(store.save(stored).await.is_err());
        }
        assert!(store.locks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_keep_one_winner() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path()).unwrap();
        let stored = store
            .create(Checkpoint::paused(Uuid::new_v4(), Utc::now()))
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let stale = stored.clone();
                tokio::spawn(async move { store.save(stale).await })
            })
            .collect();
        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(store.get(&stored.run_id).await.unwrap().version, 2);
        assert!(store.locks.is_empty());
    }

    #[tokio::test]
    async fn test_patch_and_no_temp_files_left() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path()).unwrap();
        let stored = store
            .create(Checkpoint::paused(Uuid::new_v4(), Utc::now()))
            .await
            .unwrap();

        let now = Utc::now();
        let patched = store
            .patch(&stored.run_id, CheckpointPatch::new().with_reminder_sent(now))
            .await
            .unwrap();
        assert!(patched.reminder_email_sent);

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![format!("{}.json", stored.run_id)]);
    }

    #[tokio::test]
    async fn test_concurrent_writers_only_one_wins() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path()).unwrap();
        let stored = store
            .create(Checkpoint::paused(Uuid::new_v4(), Utc::now()))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let mut candidate = stored.clone();
            candidate.reminder_email_sent = true;
            handles.push(tokio::spawn(async move { store.save(candidate).await }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(store.get(&stored.run_id).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_corrupt_document_is_an_error() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path()).unwrap();
        let run_id = Uuid::new_v4();
        std::fs::write(dir.path().join(format!("{}.json", run_id)), b"{not json").unwrap();

        let err = store.load(&run_id).await.unwrap_err();
        assert!(err.is_storage());
    }
}
