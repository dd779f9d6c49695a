//! Decision finalization
//!
//! Applies a human decision presented with an emailed token.
//!
//! ```text
//!   resolve token ─▶ stage matches? ─▶ load ─▶ token is current? ─▶ already decided?
//!                                                                     │yes: echo it
//!                                                                     ▼no
//!        stage1: validate, record, trigger? ── yes ─▶ mint EDD token, open EDD stage
//!                                     └────── no ──▶ complete(approved | rejected)
//!        edd:    validate, record ───────────────▶ complete(approved_with_edd | rejected)
//!                                                                     │
//!                                          CAS save ── conflict ─▶ reload, start over
//!                                                                     │ok
//!                                                      notify EDD reviewer (if opened)
//! ```
//!
//! A duplicate submission, concurrent or not, lands in the "already decided"
//! branch and returns the recorded decision without touching the record.

use chrono::{DateTime, Utc};
use hitl_checkpoint::{
    Checkpoint, CheckpointError, Decision, DecisionRecord, EddStage, FinalDecision, RunId,
    RunStatus, Stage, MAX_CAS_ATTEMPTS,
};
use serde::Serialize;

use super::{
    error::{ApprovalError, ApprovalResult},
    notifier::{Notification, NotificationKind},
    trigger::is_escalation_trigger,
    ApprovalContext,
};

/// Signer recorded when neither a signer nor a recipient is known
pub const ANONYMOUS_SIGNER: &str = "email-link";

/// A decision as presented by the reviewer
#[derive(Debug, Clone)]
pub struct Submission {
    pub token: String,
    pub action: Decision,
    pub comment: Option<String>,
    pub signer: Option<String>,
}

impl Submission {
    pub fn new(token: impl Into<String>, action: Decision) -> Self {
        Self {
            token: token.into(),
            action,
            comment: None,
            signer: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_signer(mut self, signer: impl Into<String>) -> Self {
        self.signer = Some(signer.into());
        self
    }
}

/// Outcome of a submission
#[derive(Debug, Clone, Serialize)]
pub struct DecisionResult {
    pub run_id: RunId,
    pub stage: Stage,
    pub decision: Decision,
    pub decided_by: String,
    pub decided_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// The decision was recorded by an earlier submission
    pub already_decided: bool,
    pub status: RunStatus,
    pub final_decision: Option<FinalDecision>,
    pub edd_status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_warning: Option<String>,
}

impl DecisionResult {
    fn from_checkpoint(
        checkpoint: &Checkpoint,
        stage: Stage,
        record: DecisionRecord,
        already_decided: bool,
    ) -> Self {
        Self {
            run_id: checkpoint.run_id,
            stage,
            decision: record.decision,
            decided_by: record.decided_by,
            decided_at: record.decided_at,
            comment: record.comment,
            already_decided,
            status: checkpoint.status,
            final_decision: checkpoint.final_decision,
            edd_status: checkpoint.edd_stage.status_label(),
            notification_warning: None,
        }
    }
}

/// Applies decisions to checkpoints
#[derive(Debug, Clone)]
pub struct DecisionFinalizer {
    ctx: ApprovalContext,
}

impl DecisionFinalizer {
    pub fn new(ctx: ApprovalContext) -> Self {
        Self { ctx }
    }

    /// Apply `submission` at the endpoint serving `stage`
    pub async fn submit(&self, stage: Stage, submission: Submission) -> ApprovalResult<DecisionResult> {
        let token = submission.token.trim();
        if token.is_empty() {
            return Err(ApprovalError::Validation("token is required".to_string()));
        }

        let grant = self
            .ctx
            .tokens
            .resolve(token)
            .await?
            .ok_or(ApprovalError::InvalidToken)?;
        if grant.stage != stage {
            return Err(ApprovalError::WrongStage {
                expected: stage,
                actual: grant.stage,
            });
        }

        let comment = submission
            .comment
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let signer = submission
            .signer
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let mut checkpoint = self.ctx.store.get(&grant.run_id).await?;
            if checkpoint.token_for(stage) != Some(token) {
                return Err(ApprovalError::InvalidToken);
            }
            if let Some(existing) = checkpoint.decision_for(stage) {
                tracing::info!(
                    run_id = %checkpoint.run_id,
                    %stage,
                    decision = %existing.decision,
                    "Decision already recorded"
                );
                return Ok(DecisionResult::from_checkpoint(&checkpoint, stage, existing, true));
            }
            if checkpoint.status != RunStatus::Paused {
                return Err(ApprovalError::NotAwaitingDecision {
                    run_id: checkpoint.run_id,
                });
            }
            self.validate(submission.action, comment.as_deref())?;

            let now = self.ctx.clock.now();
            let applied = match stage {
                Stage::Stage1 => {
                    self.apply_stage1(&mut checkpoint, submission.action, comment.clone(), signer.clone(), now)
                        .await?
                }
                Stage::Edd => {
                    self.apply_edd(&mut checkpoint, submission.action, comment.clone(), signer.clone(), now)?;
                    None
                }
            };

            match self.ctx.store.save(checkpoint).await {
                Ok(stored) => {
                    let record = stored.decision_for(stage).ok_or_else(|| {
                        ApprovalError::Persistence(CheckpointError::Storage(format!(
                            "decision for {} missing after save",
                            stored.run_id
                        )))
                    })?;
                    tracing::info!(
                        run_id = %stored.run_id,
                        %stage,
                        decision = %record.decision,
                        decided_by = %record.decided_by,
                        final_decision = ?stored.final_decision,
                        edd = stored.edd_stage.status_label(),
                        "Decision recorded"
                    );

                    let mut result = DecisionResult::from_checkpoint(&stored, stage, record, false);
                    if let Some(edd_token) = applied {
                        result.notification_warning = self.notify_edd(&stored, &edd_token).await;
                    }
                    return Ok(result);
                }
                Err(CheckpointError::VersionConflict { expected, found, .. }) => {
                    tracing::warn!(
                        run_id = %grant.run_id,
                        %stage,
                        attempt,
                        expected,
                        found,
                        "Concurrent write while recording decision; reloading"
                    );
                    if let Some(edd_token) = applied {
                        self.discard_token(&edd_token).await;
                    }
                }
                Err(e) => {
                    if let Some(edd_token) = applied {
                        self.discard_token(&edd_token).await;
                    }
                    return Err(e.into());
                }
            }
        }

        Err(ApprovalError::Persistence(CheckpointError::Storage(format!(
            "decision for {} gave up after {} conflicting writes",
            grant.run_id, MAX_CAS_ATTEMPTS
        ))))
    }

    fn validate(&self, action: Decision, comment: Option<&str>) -> ApprovalResult<()> {
        if action == Decision::Reject {
            let min = self.ctx.settings.min_comment_chars;
            let chars = comment.map(|c| c.chars().count()).unwrap_or(0);
            if chars < min {
                return Err(ApprovalError::Validation(format!(
                    "A rejection reason of at least {} characters is required",
                    min
                )));
            }
        }
        Ok(())
    }

    /// Record the stage-1 decision; returns the EDD token if the stage was opened
    async fn apply_stage1(
        &self,
        checkpoint: &mut Checkpoint,
        action: Decision,
        comment: Option<String>,
        signer: Option<String>,
        now: DateTime<Utc>,
    ) -> ApprovalResult<Option<String>> {
        let decided_by = signer
            .or_else(|| checkpoint.approval_email_to.clone())
            .unwrap_or_else(|| ANONYMOUS_SIGNER.to_string());
        let escalate = action == Decision::Reject
            && comment.as_deref().map(is_escalation_trigger).unwrap_or(false);

        checkpoint.record_stage1_decision(
            DecisionRecord::new(action, decided_by, now).with_comment(comment),
        )?;

        if escalate {
            let edd_token = self.ctx.tokens.mint(checkpoint.run_id, Stage::Edd).await?;
            let recipient = self.edd_recipient();
            checkpoint.open_edd_stage(EddStage::waiting(&edd_token, recipient, now))?;
            Ok(Some(edd_token))
        } else {
            checkpoint.complete(FinalDecision::from(action), now)?;
            Ok(None)
        }
    }

    fn apply_edd(
        &self,
        checkpoint: &mut Checkpoint,
        action: Decision,
        comment: Option<String>,
        signer: Option<String>,
        now: DateTime<Utc>,
    ) -> ApprovalResult<()> {
        if !checkpoint.edd_stage.is_waiting() {
            return Err(ApprovalError::NotAwaitingDecision {
                run_id: checkpoint.run_id,
            });
        }
        let decided_by = signer
            .or_else(|| checkpoint.edd_stage.recipient().map(str::to_string))
            .unwrap_or_else(|| ANONYMOUS_SIGNER.to_string());

        checkpoint.record_edd_decision(
            DecisionRecord::new(action, decided_by, now).with_comment(comment),
        )?;
        let final_decision = match action {
            Decision::Approve => FinalDecision::ApprovedWithEdd,
            Decision::Reject => FinalDecision::Rejected,
        };
        checkpoint.complete(final_decision, now)?;
        Ok(())
    }

    fn edd_recipient(&self) -> Option<String> {
        self.ctx
            .settings
            .edd_recipient
            .clone()
            .or_else(|| self.ctx.settings.fallback_recipient.clone())
    }

    async fn notify_edd(&self, checkpoint: &Checkpoint, edd_token: &str) -> Option<String> {
        let Some(recipient) = checkpoint.edd_stage.recipient() else {
            tracing::warn!(run_id = %checkpoint.run_id, "No EDD recipient configured; request not sent");
            return Some("no EDD recipient configured; request not sent".to_string());
        };
        let notification = Notification::new(
            NotificationKind::EddRequest,
            recipient,
            checkpoint.run_id,
            Stage::Edd,
            edd_token,
            &self.ctx.settings.base_url,
            checkpoint.checkpoint_metadata.clone(),
        );
        self.ctx.dispatch(&notification).await
    }

    async fn discard_token(&self, token: &str) {
        if let Err(e) = self.ctx.tokens.evict(token).await {
            tracing::warn!(error = %e, "Failed to evict unused EDD token");
        }
    }
}
