//! Externally visible approval status
//!
//! [`project`] is a pure function of a checkpoint and "now". Derivation order:
//!
//! | Condition (first match wins)          | Status                 |
//! |---------------------------------------|------------------------|
//! | `final_decision` approved / with EDD  | `approved`             |
//! | `final_decision` rejected             | `rejected`             |
//! | EDD stage waiting                     | `waiting_edd_approval` |
//! | `status == completed`                 | `completed`            |
//! | `status == failed`                    | `failed`               |
//! | otherwise                             | `waiting_human`        |

use chrono::{DateTime, Duration, Utc};
use hitl_checkpoint::{Checkpoint, Decision, EddStage, FinalDecision, RunId, RunStatus};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    WaitingHuman,
    WaitingEddApproval,
    Approved,
    Rejected,
    Completed,
    Failed,
}

/// EDD sub-stage as shown to clients (tokens are never exposed)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EddView {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_email_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}

impl EddView {
    fn from_stage(stage: &EddStage) -> Option<Self> {
        if stage.is_not_triggered() {
            return None;
        }
        let record = stage.decision();
        Some(Self {
            status: stage.status_label(),
            approval_email_to: stage.recipient().map(str::to_string),
            decision: record.as_ref().map(|r| r.decision),
            decided_by: record.as_ref().map(|r| r.decided_by.clone()),
            decided_at: record.as_ref().map(|r| r.decided_at),
        })
    }
}

/// Poll response body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusView {
    pub run_id: RunId,
    pub status: ApprovalStatus,
    pub run_status: RunStatus,
    pub decision: Option<Decision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_comment: Option<String>,
    pub final_decision: Option<FinalDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edd_stage: Option<EddView>,
    pub approval_email_sent: bool,
    pub reminder_email_sent: bool,
    pub manual_reminder_count: u32,
    /// Delivery failure of a reminder claimed by this poll
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_due_in_seconds: Option<i64>,
    pub checkpoint_metadata: Value,
    pub topic_summaries: Value,
    pub issues: Value,
}

/// Derive the visible status of `checkpoint` at `now`
pub fn project(checkpoint: &Checkpoint, now: DateTime<Utc>, reminder_delay: Duration) -> StatusView {
    let status = match checkpoint.final_decision {
        Some(FinalDecision::Approved) | Some(FinalDecision::ApprovedWithEdd) => ApprovalStatus::Approved,
        Some(FinalDecision::Rejected) => ApprovalStatus::Rejected,
        None if checkpoint.edd_stage.is_waiting() => ApprovalStatus::WaitingEddApproval,
        None => match checkpoint.status {
            RunStatus::Completed => ApprovalStatus::Completed,
            RunStatus::Failed => ApprovalStatus::Failed,
            RunStatus::Paused => ApprovalStatus::WaitingHuman,
        },
    };

    let (elapsed_seconds, reminder_due_in_seconds) = if status == ApprovalStatus::WaitingHuman {
        let since = checkpoint.approval_sent_at.unwrap_or(checkpoint.created_at);
        let elapsed = (now - since).num_seconds().max(0);
        let due_in = if checkpoint.reminder_email_sent {
            None
        } else {
            checkpoint
                .reminder_due_at(reminder_delay)
                .map(|due| (due - now).num_seconds().max(0))
        };
        (Some(elapsed), due_in)
    } else {
        (None, None)
    };

    StatusView {
        run_id: checkpoint.run_id,
        status,
        run_status: checkpoint.status,
        decision: checkpoint.decision,
        decided_by: checkpoint.decided_by.clone(),
        decided_at: checkpoint.decided_at,
        decision_comment: checkpoint.decision_comment.clone(),
        final_decision: checkpoint.final_decision,
        edd_stage: EddView::from_stage(&checkpoint.edd_stage),
        approval_email_sent: checkpoint.approval_email_sent,
        reminder_email_sent: checkpoint.reminder_email_sent,
        manual_reminder_count: checkpoint.manual_reminder_count,
        reminder_warning: None,
        elapsed_seconds,
        reminder_due_in_seconds,
        checkpoint_metadata: checkpoint.checkpoint_metadata.clone(),
        topic_summaries: checkpoint.topic_summaries.clone(),
        issues: checkpoint.issues.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitl_checkpoint::DecisionRecord;
    use serde_json::json;
    use uuid::Uuid;

    const DELAY: i64 = 180;

    fn waiting(now: DateTime<Utc>, sent_ago: i64) -> Checkpoint {
        let mut checkpoint = Checkpoint::paused(Uuid::new_v4(), now - Duration::seconds(sent_ago))
            .with_approval_token("tok")
            .with_recipient("reviewer@example.com")
            .with_payload(
                json!([]),
                json!({}),
                json!({"b": "second", "a": "first"}),
                json!([{"severity": "high"}]),
                json!({"title": "Vendor onboarding"}),
            );
        checkpoint.mark_approval_sent(now - Duration::seconds(sent_ago), Duration::seconds(DELAY));
        checkpoint
    }

    #[test]
    fn test_waiting_human_reports_timers() {
        let now = Utc::now();
        let view = project(&waiting(now, 60), now, Duration::seconds(DELAY));

        assert_eq!(view.status, ApprovalStatus::WaitingHuman);
        assert_eq!(view.elapsed_seconds, Some(60));
        assert_eq!(view.reminder_due_in_seconds, Some(120));
        assert_eq!(view.checkpoint_metadata["title"], json!("Vendor onboarding"));
        assert_eq!(view.issues[0]["severity"], json!("high"));
    }

    #[test]
    fn test_overdue_reminder_is_never_negative() {
        let now = Utc::now();
        let view = project(&waiting(now, 500), now, Duration::seconds(DELAY));
        assert_eq!(view.reminder_due_in_seconds, Some(0));

        let mut sent = waiting(now, 500);
        sent.mark_reminder_sent(now);
        let view = project(&sent, now, Duration::seconds(DELAY));
        assert_eq!(view.reminder_due_in_seconds, None);
        assert!(view.reminder_email_sent);
    }

    #[test]
    fn test_terminal_statuses() {
        let now = Utc::now();

        let mut approved = waiting(now, 10);
        approved
            .record_stage1_decision(DecisionRecord::new(Decision::Approve, "alice", now))
            .unwrap();
        approved.complete(FinalDecision::Approved, now).unwrap();
        let view = project(&approved, now, Duration::seconds(DELAY));
        assert_eq!(view.status, ApprovalStatus::Approved);
        assert_eq!(view.elapsed_seconds, None);

        let mut failed = waiting(now, 10);
        failed.fail(now).unwrap();
        assert_eq!(project(&failed, now, Duration::seconds(DELAY)).status, ApprovalStatus::Failed);

        let mut completed = waiting(now, 10);
        completed.status = RunStatus::Completed;
        assert_eq!(
            project(&completed, now, Duration::seconds(DELAY)).status,
            ApprovalStatus::Completed
        );
    }

    #[test]
    fn test_edd_statuses() {
        let now = Utc::now();
        let mut checkpoint = waiting(now, 10);
        checkpoint
            .record_stage1_decision(
                DecisionRecord::new(Decision::Reject, "bob", now)
                    .with_comment(Some("Reject. Route: EDD.".into())),
            )
            .unwrap();
        checkpoint
            .open_edd_stage(EddStage::waiting("edd-tok", Some("edd@example.com".into()), now))
            .unwrap();

        let view = project(&checkpoint, now, Duration::seconds(DELAY));
        assert_eq!(view.status, ApprovalStatus::WaitingEddApproval);
        assert_eq!(view.decision, Some(Decision::Reject));
        let edd = view.edd_stage.unwrap();
        assert_eq!(edd.status, "waiting_edd_approval");
        assert_eq!(edd.approval_email_to.as_deref(), Some("edd@example.com"));

        checkpoint
            .record_edd_decision(DecisionRecord::new(Decision::Approve, "carol", now))
            .unwrap();
        checkpoint.complete(FinalDecision::ApprovedWithEdd, now).unwrap();
        let view = project(&checkpoint, now, Duration::seconds(DELAY));
        assert_eq!(view.status, ApprovalStatus::Approved);
        assert_eq!(view.final_decision, Some(FinalDecision::ApprovedWithEdd));

        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["final_decision"], json!("approved_with_edd"));
        assert_eq!(value["edd_stage"]["decided_by"], json!("carol"));
        assert!(value["edd_stage"].get("approval_token").is_none());
    }

    #[test]
    fn test_payload_order_is_preserved() {
        let now = Utc::now();
        let view = project(&waiting(now, 10), now, Duration::seconds(DELAY));
        let rendered = serde_json::to_string(&view.topic_summaries).unwrap();
        assert_eq!(rendered, r#"{"b":"second","a":"first"}"#);
    }
}
