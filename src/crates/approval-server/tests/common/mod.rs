//! Shared fixtures for approval-server integration tests

#![allow(dead_code)]

use approval_server::services::{
    ApprovalContext, ApprovalService, ApprovalSettings, Clock, ManualClock, Notification,
    NotificationError, NotificationKind, Notifier,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hitl_checkpoint::{
    Checkpoint, CheckpointError, CheckpointStore, InMemoryCheckpointStore, InMemoryTokenRegistry,
    Result as CheckpointResult, RunId,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const REVIEWER: &str = "reviewer@example.com";
pub const EDD_REVIEWER: &str = "edd@example.com";

/// Notifier that records every notification it is asked to send
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.sent.lock().iter().filter(|n| n.kind == kind).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}

/// Notifier that records attempts and always fails
#[derive(Debug, Default, Clone)]
pub struct FailingNotifier {
    attempts: Arc<Mutex<Vec<Notification>>>,
}

impl FailingNotifier {
    pub fn attempts(&self) -> usize {
        self.attempts.lock().len()
    }
}

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        self.attempts.lock().push(notification.clone());
        Err(NotificationError::Transport("relay unavailable".to_string()))
    }
}

/// Store that can be told to refuse every save
#[derive(Debug, Default, Clone)]
pub struct FlakyStore {
    inner: InMemoryCheckpointStore,
    refuse_saves: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn refuse_saves(&self, refuse: bool) {
        self.refuse_saves.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl CheckpointStore for FlakyStore {
    async fn load(&self, run_id: &RunId) -> CheckpointResult<Option<Checkpoint>> {
        self.inner.load(run_id).await
    }

    async fn save(&self, checkpoint: Checkpoint) -> CheckpointResult<Checkpoint> {
        if self.refuse_saves.load(Ordering::SeqCst) {
            return Err(CheckpointError::Storage("disk full".to_string()));
        }
        self.inner.save(checkpoint).await
    }
}

/// Services wired to in-memory collaborators and a manual clock
pub struct Harness {
    pub service: ApprovalService,
    pub store: Arc<dyn CheckpointStore>,
    pub tokens: InMemoryTokenRegistry,
    pub clock: ManualClock,
}

impl Harness {
    pub fn clock_now(&self) -> chrono::DateTime<Utc> {
        self.clock.now()
    }
}

pub fn start_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().unwrap_or_else(Utc::now)
}

pub fn settings() -> ApprovalSettings {
    ApprovalSettings {
        edd_recipient: Some(EDD_REVIEWER.to_string()),
        base_url: "https://approvals.example.com".to_string(),
        ..ApprovalSettings::default()
    }
}

pub fn harness_with(
    store: Arc<dyn CheckpointStore>,
    notifier: Arc<dyn Notifier>,
    settings: ApprovalSettings,
) -> Harness {
    let tokens = InMemoryTokenRegistry::new();
    let clock = ManualClock::new(start_time());
    let ctx = ApprovalContext::new(
        store.clone(),
        Arc::new(tokens.clone()),
        notifier,
        Arc::new(clock.clone()),
        settings,
    );
    Harness {
        service: ApprovalService::new(ctx),
        store,
        tokens,
        clock,
    }
}

pub fn harness(notifier: Arc<dyn Notifier>) -> Harness {
    harness_with(Arc::new(InMemoryCheckpointStore::new()), notifier, settings())
}
