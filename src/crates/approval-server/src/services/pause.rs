//! Pausing a run for human approval
//!
//! Entry point for the content analysis engine. Opening a checkpoint mints the
//! stage-1 token, records the notification intent, persists the record, and
//! only then sends the approval request.

use chrono::{DateTime, Utc};
use hitl_checkpoint::{Checkpoint, RunId, Stage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    error::{ApprovalError, ApprovalResult},
    notifier::{Notification, NotificationKind},
    ApprovalContext,
};

/// Checkpoint creation request from the analysis engine
#[derive(Debug, Clone, Deserialize)]
pub struct PauseRequest {
    pub run_id: RunId,
    #[serde(default)]
    pub approval_email_to: Option<String>,
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

impl PauseRequest {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            approval_email_to: None,
            documents: Value::Null,
            graph_state: Value::Null,
            topic_summaries: Value::Null,
            issues: Value::Null,
            checkpoint_metadata: Value::Null,
        }
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.approval_email_to = Some(recipient.into());
        self
    }

    pub fn with_metadata(mut self, checkpoint_metadata: Value) -> Self {
        self.checkpoint_metadata = checkpoint_metadata;
        self
    }
}

/// Result of opening a checkpoint
#[derive(Debug, Clone, Serialize)]
pub struct PauseOutcome {
    pub run_id: RunId,
    pub approval_token: String,
    pub approval_email_to: Option<String>,
    pub approval_email_sent: bool,
    pub reminder_due_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_warning: Option<String>,
}

/// Opens checkpoints for paused runs
#[derive(Debug, Clone)]
pub struct PauseService {
    ctx: ApprovalContext,
}

impl PauseService {
    pub fn new(ctx: ApprovalContext) -> Self {
        Self { ctx }
    }

    pub async fn pause(&self, request: PauseRequest) -> ApprovalResult<PauseOutcome> {
        let run_id = request.run_id;
        if self.ctx.store.load(&run_id).await?.is_some() {
            return Err(ApprovalError::AlreadyExists(run_id));
        }

        let recipient = request
            .approval_email_to
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .or_else(|| self.ctx.settings.fallback_recipient.clone());

        let now = self.ctx.clock.now();
        let token = self.ctx.tokens.mint(run_id, Stage::Stage1).await?;

        let mut checkpoint = Checkpoint::paused(run_id, now)
            .with_approval_token(&token)
            .with_payload(
                request.documents,
                request.graph_state,
                request.topic_summaries,
                request.issues,
                request.checkpoint_metadata,
            );
        if let Some(recipient) = &recipient {
            checkpoint = checkpoint.with_recipient(recipient);
            checkpoint.mark_approval_sent(now, self.ctx.settings.reminder_delay);
        }

        let stored = match self.ctx.store.create(checkpoint).await {
            Ok(stored) => stored,
            Err(e) => {
                if let Err(evict_err) = self.ctx.tokens.evict(&token).await {
                    tracing::warn!(%run_id, error = %evict_err, "Failed to evict unused token");
                }
                return Err(e.into());
            }
        };
        tracing::info!(%run_id, recipient = ?recipient, "Run paused for approval");

        let notification_warning = match &recipient {
            Some(recipient) => {
                let notification = Notification::new(
                    NotificationKind::ApprovalRequest,
                    recipient,
                    run_id,
                    Stage::Stage1,
                    &token,
                    &self.ctx.settings.base_url,
                    stored.checkpoint_metadata.clone(),
                );
                self.ctx.dispatch(&notification).await
            }
            None => {
                tracing::warn!(%run_id, "No approval recipient configured; request not sent");
                Some("no approval recipient configured; request not sent".to_string())
            }
        };

        Ok(PauseOutcome {
            run_id,
            approval_token: token,
            approval_email_to: stored.approval_email_to.clone(),
            approval_email_sent: stored.approval_email_sent,
            reminder_due_at: stored.reminder_due_at,
            notification_warning,
        })
    }
}
