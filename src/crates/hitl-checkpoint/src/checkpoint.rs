//! Core checkpoint data structures for paused approval runs
//!
//! This module defines the durable record of a run that is waiting for a human
//! decision: **[`Checkpoint`]**, its two-stage decision model (**[`Decision`]**,
//! **[`DecisionRecord`]**, **[`EddStage`]**), and the terminal classification
//! **[`FinalDecision`]**.
//!
//! # Overview
//!
//! A checkpoint is created by the upstream analysis engine when it pauses a run.
//! From then on it is only mutated by three writers:
//!
//! - **Decision finalization** - records the stage-1 decision and, when the
//!   rejection comment asks for it, opens the EDD stage
//! - **EDD finalization** - records the second-stage decision
//! - **Reminder scheduling** - marks the reminder as sent before sending it
//!
//! The collaborator payload (`documents`, `graph_state`, `topic_summaries`,
//! `issues`, `checkpoint_metadata`) is stored as opaque JSON and returned
//! unchanged.
//!
//! # Lifecycle
//!
//! ```text
//!                     stage-1 approve / reject (no trigger)
//!   ┌────────┐  ────────────────────────────────────────────▶  ┌───────────┐
//!   │ paused │                                                 │ completed │
//!   └────────┘  ──┐                                       ┌──▶ └───────────┘
//!                 │ stage-1 reject + escalation trigger   │
//!                 ▼                                       │ EDD approve / reject
//!        ┌───────────────────────────┐                    │
//!        │ paused                    │ ───────────────────┘
//!        │ edd_stage: waiting_edd_…  │
//!        └───────────────────────────┘
//! ```
//!
//! # Persisted Layout
//!
//! Field names are part of the on-disk format and are shared with the UI layer,
//! so the stage-1 decision is stored as flat fields (`decision`, `decided_by`,
//! `decided_at`, `decision_comment`) while the EDD stage is a nested document
//! tagged by its `status`:
//!
//! ```json
//! {
//!   "run_id": "1f0c…",
//!   "version": 3,
//!   "status": "paused",
//!   "decision": "reject",
//!   "decision_comment": "Reject. Route: EDD.",
//!   "edd_stage": { "status": "waiting_edd_approval", "approval_token": "…" }
//! }
//! ```
//!
//! # Versions
//!
//! `version` is bumped by the store on every successful save and is used for
//! compare-and-swap writes. A record that was never stored has version `0`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{CheckpointError, Result};

/// Unique identifier of a paused run
pub type RunId = Uuid;

/// Coarse lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Waiting for a human decision
    Paused,
    /// A terminal decision was reached
    Completed,
    /// The upstream engine abandoned the run
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Paused => write!(f, "paused"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Decision stage a token authorizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// First approval stage
    Stage1,
    /// Enhanced due diligence stage
    Edd,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Stage1 => write!(f, "stage1"),
            Stage::Edd => write!(f, "edd"),
        }
    }
}

/// Action taken by the reviewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Approve => write!(f, "approve"),
            Decision::Reject => write!(f, "reject"),
        }
    }
}

impl std::str::FromStr for Decision {
    type Err = CheckpointError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" => Ok(Decision::Approve),
            "reject" | "rejected" => Ok(Decision::Reject),
            other => Err(CheckpointError::Invalid(format!("unknown action: {}", other))),
        }
    }
}

/// Terminal classification of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalDecision {
    Approved,
    Rejected,
    ApprovedWithEdd,
}

impl From<Decision> for FinalDecision {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approve => FinalDecision::Approved,
            Decision::Reject => FinalDecision::Rejected,
        }
    }
}

/// A decision together with its audit fields
///
/// The four fields are always written together; a checkpoint never holds a
/// decision without its signer and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision: Decision,
    pub decided_by: String,
    pub decided_at: DateTime<Utc>,
    pub comment: Option<String>,
}

impl DecisionRecord {
    /// Create a decision record stamped at `decided_at`
    pub fn new(decision: Decision, decided_by: impl Into<String>, decided_at: DateTime<Utc>) -> Self {
        Self {
            decision,
            decided_by: decided_by.into(),
            decided_at,
            comment: None,
        }
    }

    /// Attach the reviewer's free-text comment
    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }
}

/// Enhanced due diligence sub-stage
///
/// Serialized as a nested document tagged by `status`. `NotTriggered` is the
/// default and is omitted from the persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EddStage {
    /// The stage-1 decision did not request EDD
    #[default]
    NotTriggered,

    /// EDD requested; waiting for the second reviewer
    WaitingEddApproval {
        approval_token: String,
        #[serde(default)]
        approval_email_to: Option<String>,
        #[serde(default)]
        approval_email_sent: bool,
        #[serde(default)]
        approval_sent_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    },

    /// The second reviewer decided
    Decided {
        approval_token: String,
        decision: Decision,
        decided_by: String,
        decided_at: DateTime<Utc>,
        #[serde(default)]
        decision_comment: Option<String>,
    },
}

impl EddStage {
    /// Open a waiting EDD stage with notification intent recorded
    pub fn waiting(
        approval_token: impl Into<String>,
        recipient: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        EddStage::WaitingEddApproval {
            approval_token: approval_token.into(),
            approval_email_sent: recipient.is_some(),
            approval_sent_at: recipient.as_ref().map(|_| now),
            approval_email_to: recipient,
            created_at: now,
        }
    }

    pub fn is_not_triggered(&self) -> bool {
        matches!(self, EddStage::NotTriggered)
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, EddStage::WaitingEddApproval { .. })
    }

    /// Token that authorizes the EDD decision, if the stage exists
    pub fn approval_token(&self) -> Option<&str> {
        match self {
            EddStage::NotTriggered => None,
            EddStage::WaitingEddApproval { approval_token, .. }
            | EddStage::Decided { approval_token, .. } => Some(approval_token.as_str()),
        }
    }

    /// Recipient of the EDD request
    pub fn recipient(&self) -> Option<&str> {
        match self {
            EddStage::WaitingEddApproval {
                approval_email_to, ..
            } => approval_email_to.as_deref(),
            _ => None,
        }
    }

    /// The recorded EDD decision, if any
    pub fn decision(&self) -> Option<DecisionRecord> {
        match self {
            EddStage::Decided {
                decision,
                decided_by,
                decided_at,
                decision_comment,
                ..
            } => Some(DecisionRecord {
                decision: *decision,
                decided_by: decided_by.clone(),
                decided_at: *decided_at,
                comment: decision_comment.clone(),
            }),
            _ => None,
        }
    }

    /// Status label used in persisted records and API views
    pub fn status_label(&self) -> &'static str {
        match self {
            EddStage::NotTriggered => "not_triggered",
            EddStage::WaitingEddApproval { .. } => "waiting_edd_approval",
            EddStage::Decided { .. } => "decided",
        }
    }
}

/// Durable record of a paused run awaiting a human decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Primary key, minted by the upstream engine
    pub run_id: RunId,

    /// Record version for compare-and-swap saves (0 = never stored)
    #[serde(default)]
    pub version: u64,

    pub status: RunStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    // Stage-1 decision, written once
    #[serde(default)]
    pub decision: Option<Decision>,
    #[serde(default)]
    pub decided_by: Option<String>,
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub decision_comment: Option<String>,

    /// Token minted for the stage-1 decision
    #[serde(default)]
    pub approval_token: Option<String>,

    // Stage-1 notification intent
    #[serde(default)]
    pub approval_email_to: Option<String>,
    #[serde(default)]
    pub approval_email_sent: bool,
    #[serde(default)]
    pub approval_sent_at: Option<DateTime<Utc>>,

    // Reminder state; `reminder_email_sent` only flips after a durable write
    #[serde(default)]
    pub reminder_due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reminder_email_sent: bool,
    #[serde(default)]
    pub reminder_sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub manual_reminder_count: u32,

    #[serde(default, skip_serializing_if = "EddStage::is_not_triggered")]
    pub edd_stage: EddStage,

    #[serde(default)]
    pub final_decision: Option<FinalDecision>,

    // Collaborator payload, never interpreted here
    #[serde(default)]
    pub documents: Value,
    #[serde(default)]
    pub graph_state: Value,
    #[serde(default)]
    pub topic_summaries: Value,
    #[serde(default)]
    pub issues: Value,
    #[serde(default)]
    pub checkpoint_metadata: Value,
}

impl Checkpoint {
    /// Create a paused checkpoint that has never been stored
    pub fn paused(run_id: RunId, now: DateTime<Utc>) -> Self {
        Self {
            run_id,
            version: 0,
            status: RunStatus::Paused,
            created_at: now,
            updated_at: now,
            decision: None,
            decided_by: None,
            decided_at: None,
            decision_comment: None,
            approval_token: None,
            approval_email_to: None,
            approval_email_sent: false,
            approval_sent_at: None,
            reminder_due_at: None,
            reminder_email_sent: false,
            reminder_sent_at: None,
            manual_reminder_count: 0,
            edd_stage: EddStage::NotTriggered,
            final_decision: None,
            documents: Value::Null,
            graph_state: Value::Null,
            topic_summaries: Value::Null,
            issues: Value::Null,
            checkpoint_metadata: Value::Null,
        }
    }

    /// Set the stage-1 token
    pub fn with_approval_token(mut self, token: impl Into<String>) -> Self {
        self.approval_token = Some(token.into());
        self
    }

    /// Set the stage-1 recipient
    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.approval_email_to = Some(recipient.into());
        self
    }

    /// Attach the collaborator payload
    pub fn with_payload(
        mut self,
        documents: Value,
        graph_state: Value,
        topic_summaries: Value,
        issues: Value,
        checkpoint_metadata: Value,
    ) -> Self {
        self.documents = documents;
        self.graph_state = graph_state;
        self.topic_summaries = topic_summaries;
        self.issues = issues;
        self.checkpoint_metadata = checkpoint_metadata;
        self
    }

    /// Record that the approval request is about to be sent
    pub fn mark_approval_sent(&mut self, now: DateTime<Utc>, reminder_delay: Duration) {
        self.approval_email_sent = true;
        self.approval_sent_at = Some(now);
        self.reminder_due_at = now.checked_add_signed(reminder_delay);
    }

    /// The stage-1 decision with its audit fields
    pub fn stage1_decision(&self) -> Option<DecisionRecord> {
        let decision = self.decision?;
        Some(DecisionRecord {
            decision,
            decided_by: self.decided_by.clone().unwrap_or_default(),
            decided_at: self.decided_at.unwrap_or(self.updated_at),
            comment: self.decision_comment.clone(),
        })
    }

    /// The decision already recorded for `stage`, if any
    pub fn decision_for(&self, stage: Stage) -> Option<DecisionRecord> {
        match stage {
            Stage::Stage1 => self.stage1_decision(),
            Stage::Edd => self.edd_stage.decision(),
        }
    }

    /// The token currently valid for `stage`
    pub fn token_for(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::Stage1 => self.approval_token.as_deref(),
            Stage::Edd => self.edd_stage.approval_token(),
        }
    }

    /// Whether the run still waits for its stage-1 decision
    pub fn is_awaiting_stage1(&self) -> bool {
        self.status == RunStatus::Paused && self.decision.is_none()
    }

    /// Record the stage-1 decision
    ///
    /// The decision is write-once: a second call fails with
    /// [`CheckpointError::AlreadyDecided`] and leaves the record untouched.
    pub fn record_stage1_decision(&mut self, record: DecisionRecord) -> Result<()> {
        if self.decision.is_some() {
            return Err(CheckpointError::AlreadyDecided {
                run_id: self.run_id,
                stage: Stage::Stage1,
            });
        }
        self.decision = Some(record.decision);
        self.decided_by = Some(record.decided_by);
        self.decided_at = Some(record.decided_at);
        self.decision_comment = record.comment;
        self.updated_at = record.decided_at;
        Ok(())
    }

    /// Open the EDD stage
    ///
    /// Only valid after a stage-1 rejection and only once.
    pub fn open_edd_stage(&mut self, stage: EddStage) -> Result<()> {
        if self.decision != Some(Decision::Reject) {
            return Err(CheckpointError::Invalid(format!(
                "EDD stage requires a stage-1 rejection on run {}",
                self.run_id
            )));
        }
        if !self.edd_stage.is_not_triggered() {
            return Err(CheckpointError::Invalid(format!(
                "EDD stage already exists on run {}",
                self.run_id
            )));
        }
        self.edd_stage = stage;
        Ok(())
    }

    /// Record the EDD decision, closing the waiting stage
    pub fn record_edd_decision(&mut self, record: DecisionRecord) -> Result<()> {
        let approval_token = match &self.edd_stage {
            EddStage::WaitingEddApproval { approval_token, .. } => approval_token.clone(),
            EddStage::Decided { .. } => {
                return Err(CheckpointError::AlreadyDecided {
                    run_id: self.run_id,
                    stage: Stage::Edd,
                })
            }
            EddStage::NotTriggered => {
                return Err(CheckpointError::Invalid(format!(
                    "run {} has no EDD stage",
                    self.run_id
                )))
            }
        };
        self.updated_at = record.decided_at;
        self.edd_stage = EddStage::Decided {
            approval_token,
            decision: record.decision,
            decided_by: record.decided_by,
            decided_at: record.decided_at,
            decision_comment: record.comment,
        };
        Ok(())
    }

    /// Move a paused run to `completed` with its terminal classification
    pub fn complete(&mut self, final_decision: FinalDecision, now: DateTime<Utc>) -> Result<()> {
        self.transition(RunStatus::Completed, now)?;
        self.final_decision = Some(final_decision);
        Ok(())
    }

    /// Move a paused run to `failed`
    pub fn fail(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(RunStatus::Failed, now)
    }

    fn transition(&mut self, to: RunStatus, now: DateTime<Utc>) -> Result<()> {
        if self.status != RunStatus::Paused {
            return Err(CheckpointError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// When the automatic reminder becomes due
    ///
    /// Uses the stored `reminder_due_at`, falling back to
    /// `approval_sent_at + delay` for records written before the due time
    /// was stored.
    pub fn reminder_due_at(&self, delay: Duration) -> Option<DateTime<Utc>> {
        self.reminder_due_at
            .or_else(|| self.approval_sent_at.and_then(|sent| sent.checked_add_signed(delay)))
    }

    /// Record a reminder as sent; must be persisted before sending
    pub fn mark_reminder_sent(&mut self, now: DateTime<Utc>) {
        self.reminder_email_sent = true;
        self.reminder_sent_at = Some(now);
        self.updated_at = now;
    }
}
