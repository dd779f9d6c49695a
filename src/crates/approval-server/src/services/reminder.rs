//! Reminder scheduling
//!
//! There is no timer thread. Every status poll asks the scheduler whether the
//! automatic reminder is due, and a due reminder is claimed with a
//! compare-and-swap save *before* it is sent:
//!
//! ```text
//!   poll ─▶ due? ──no──▶ return record
//!            │yes
//!            ▼
//!   save(reminder_email_sent = true) ──conflict──▶ reload, re-check
//!            │ok                      ──error───▶ PersistenceError, nothing sent
//!            ▼
//!   send reminder (failure is only a warning; the flag stays set)
//! ```
//!
//! Two polls racing for the same reminder both try to save from the same
//! version; exactly one wins, and the loser reloads and sees the flag set.
//!
//! Manual reminders follow the same mark-then-send order, gated by a
//! cooldown measured from the last reminder of either kind.

use chrono::{DateTime, Duration, Utc};
use hitl_checkpoint::{Checkpoint, CheckpointError, RunId, Stage, MAX_CAS_ATTEMPTS};
use serde::Serialize;

use super::{
    error::{ApprovalError, ApprovalResult},
    notifier::{Notification, NotificationKind},
    ApprovalContext,
};

/// Result of a manual reminder
#[derive(Debug, Clone, Serialize)]
pub struct ManualReminderReceipt {
    pub run_id: RunId,
    pub recipient: String,
    pub reminder_sent_at: DateTime<Utc>,
    pub manual_reminder_count: u32,
    /// Earliest time the next manual reminder is accepted
    pub next_allowed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_warning: Option<String>,
}

/// Whether the automatic reminder for `checkpoint` should go out at `now`
///
/// Deliverability is checked separately: the recipient may come from
/// configuration rather than the record.
pub fn reminder_due(checkpoint: &Checkpoint, now: DateTime<Utc>, delay: Duration) -> bool {
    if !checkpoint.is_awaiting_stage1()
        || !checkpoint.approval_email_sent
        || checkpoint.reminder_email_sent
    {
        return false;
    }
    checkpoint
        .reminder_due_at(delay)
        .map(|due| now >= due)
        .unwrap_or(false)
}

/// Seconds left before a manual reminder is accepted, if any
pub fn cooldown_remaining(
    checkpoint: &Checkpoint,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> Option<u64> {
    let last = checkpoint.reminder_sent_at?;
    let remaining = last.checked_add_signed(cooldown)? - now;
    if remaining <= Duration::zero() {
        return None;
    }
    // Round up so a client never retries a fraction of a second too early
    let millis = remaining.num_milliseconds();
    Some(((millis + 999) / 1000).max(1) as u64)
}

/// Outcome of a poll-time reminder check
#[derive(Debug, Clone)]
pub struct ReminderCheck {
    /// The record as stored after the check
    pub checkpoint: Checkpoint,
    /// Set when this check claimed the reminder but sending it failed
    pub warning: Option<String>,
}

/// Evaluates and sends reminders
#[derive(Debug, Clone)]
pub struct ReminderScheduler {
    ctx: ApprovalContext,
}

impl ReminderScheduler {
    pub fn new(ctx: ApprovalContext) -> Self {
        Self { ctx }
    }

    /// Send the automatic reminder if due
    pub async fn run_due(&self, run_id: &RunId) -> ApprovalResult<ReminderCheck> {
        let delay = self.ctx.settings.reminder_delay;

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let checkpoint = self.ctx.store.get(run_id).await?;
            let now = self.ctx.clock.now();
            if !reminder_due(&checkpoint, now, delay) || self.recipient(&checkpoint).is_none() {
                return Ok(ReminderCheck {
                    checkpoint,
                    warning: None,
                });
            }

            let mut marked = checkpoint;
            marked.mark_reminder_sent(now);
            match self.ctx.store.save(marked).await {
                Ok(stored) => {
                    tracing::info!(%run_id, "Reminder claimed");
                    let warning = match self.notification(&stored, NotificationKind::Reminder) {
                        Some(notification) => self.ctx.dispatch(&notification).await,
                        None => None,
                    };
                    return Ok(ReminderCheck {
                        checkpoint: stored,
                        warning,
                    });
                }
                Err(CheckpointError::VersionConflict { expected, found, .. }) => {
                    tracing::warn!(
                        %run_id,
                        attempt,
                        expected,
                        found,
                        "Concurrent write while claiming reminder; reloading"
                    );
                }
                Err(e) => {
                    tracing::error!(%run_id, error = %e, "Failed to persist reminder flag; not sending");
                    return Err(e.into());
                }
            }
        }

        Err(ApprovalError::Persistence(CheckpointError::Storage(format!(
            "reminder for {} gave up after {} conflicting writes",
            run_id, MAX_CAS_ATTEMPTS
        ))))
    }

    /// Send a manual reminder
    pub async fn remind(&self, run_id: &RunId) -> ApprovalResult<ManualReminderReceipt> {
        let cooldown = self.ctx.settings.reminder_cooldown;

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let mut checkpoint = self.ctx.store.get(run_id).await?;
            if !checkpoint.is_awaiting_stage1() {
                return Err(ApprovalError::NotAwaitingDecision { run_id: *run_id });
            }

            let now = self.ctx.clock.now();
            if let Some(retry_after_seconds) = cooldown_remaining(&checkpoint, now, cooldown) {
                return Err(ApprovalError::CooldownActive { retry_after_seconds });
            }

            let recipient = self.recipient(&checkpoint).ok_or_else(|| {
                ApprovalError::Validation("no approval recipient recorded for this run".to_string())
            })?;
            if checkpoint.approval_token.is_none() {
                return Err(ApprovalError::Validation(
                    "run has no stage-1 approval token".to_string(),
                ));
            }

            checkpoint.mark_reminder_sent(now);
            checkpoint.manual_reminder_count += 1;
            match self.ctx.store.save(checkpoint).await {
                Ok(stored) => {
                    tracing::info!(
                        %run_id,
                        count = stored.manual_reminder_count,
                        "Manual reminder claimed"
                    );
                    let notification_warning = match self.manual_notification(&stored, &recipient) {
                        Some(notification) => self.ctx.dispatch(&notification).await,
                        None => None,
                    };
                    return Ok(ManualReminderReceipt {
                        run_id: *run_id,
                        recipient,
                        reminder_sent_at: now,
                        manual_reminder_count: stored.manual_reminder_count,
                        next_allowed_at: now + cooldown,
                        notification_warning,
                    });
                }
                Err(CheckpointError::VersionConflict { expected, found, .. }) => {
                    tracing::warn!(
                        %run_id,
                        attempt,
                        expected,
                        found,
                        "Concurrent write while claiming manual reminder; reloading"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ApprovalError::Persistence(CheckpointError::Storage(format!(
            "manual reminder for {} gave up after {} conflicting writes",
            run_id, MAX_CAS_ATTEMPTS
        ))))
    }

    /// Stored recipient, else the configured fallback
    fn recipient(&self, checkpoint: &Checkpoint) -> Option<String> {
        checkpoint
            .approval_email_to
            .clone()
            .or_else(|| self.ctx.settings.fallback_recipient.clone())
    }

    fn notification(&self, checkpoint: &Checkpoint, kind: NotificationKind) -> Option<Notification> {
        let recipient = self.recipient(checkpoint)?;
        self.build(checkpoint, kind, &recipient)
    }

    fn manual_notification(&self, checkpoint: &Checkpoint, recipient: &str) -> Option<Notification> {
        self.build(checkpoint, NotificationKind::ManualReminder, recipient)
    }

    fn build(
        &self,
        checkpoint: &Checkpoint,
        kind: NotificationKind,
        recipient: &str,
    ) -> Option<Notification> {
        let token = checkpoint.approval_token.as_deref()?;
        Some(Notification::new(
            kind,
            recipient,
            checkpoint.run_id,
            Stage::Stage1,
            token,
            &self.ctx.settings.base_url,
            checkpoint.checkpoint_metadata.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sent_at(now: DateTime<Utc>, ago: i64) -> Checkpoint {
        let mut checkpoint = Checkpoint::paused(Uuid::new_v4(), now - Duration::seconds(ago))
            .with_approval_token("tok")
            .with_recipient("reviewer@example.com");
        checkpoint.approval_email_sent = true;
        checkpoint.approval_sent_at = Some(now - Duration::seconds(ago));
        checkpoint
    }

    #[test]
    fn test_reminder_due_after_delay() {
        let now = Utc::now();
        let delay = Duration::seconds(180);
        assert!(!reminder_due(&sent_at(now, 179), now, delay));
        assert!(reminder_due(&sent_at(now, 180), now, delay));
        assert!(reminder_due(&sent_at(now, 200), now, delay));
    }

    #[test]
    fn test_reminder_not_due_once_sent_or_decided() {
        let now = Utc::now();
        let delay = Duration::seconds(180);

        let mut sent = sent_at(now, 200);
        sent.mark_reminder_sent(now);
        assert!(!reminder_due(&sent, now, delay));

        let mut decided = sent_at(now, 200);
        decided.decision = Some(hitl_checkpoint::Decision::Approve);
        assert!(!reminder_due(&decided, now, delay));

        let mut never_emailed = sent_at(now, 200);
        never_emailed.approval_email_sent = false;
        assert!(!reminder_due(&never_emailed, now, delay));
    }

    #[test]
    fn test_cooldown_remaining_rounds_up() {
        let now = Utc::now();
        let cooldown = Duration::seconds(300);
        let mut checkpoint = sent_at(now, 400);
        assert_eq!(cooldown_remaining(&checkpoint, now, cooldown), None);

        checkpoint.reminder_sent_at = Some(now - Duration::milliseconds(100_500));
        assert_eq!(cooldown_remaining(&checkpoint, now, cooldown), Some(200));

        checkpoint.reminder_sent_at = Some(now - Duration::seconds(300));
        assert_eq!(cooldown_remaining(&checkpoint, now, cooldown), None);
    }
}
