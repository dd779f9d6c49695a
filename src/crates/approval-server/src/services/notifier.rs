//! Notification sender seam
//!
//! The approval services never talk to a mail system directly. They build a
//! [`Notification`] and hand it to a [`Notifier`] through [`send_bounded`],
//! always *after* the intent to notify has been persisted:
//!
//! ```text
//!   persist flag ──▶ send_bounded(notifier, n, deadline)
//!                      ├─ Ok(())                 -> done
//!                      ├─ Err(Transport|Rejected) -> warning, flag stays set
//!                      └─ Err(TimedOut)           -> warning, flag stays set
//! ```
//!
//! A timeout is not proof that nothing was sent, so it is never treated as
//! "retry later".

use async_trait::async_trait;
use hitl_checkpoint::{RunId, Stage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Why a notification is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ApprovalRequest,
    Reminder,
    ManualReminder,
    EddRequest,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::ApprovalRequest => write!(f, "approval_request"),
            NotificationKind::Reminder => write!(f, "reminder"),
            NotificationKind::ManualReminder => write!(f, "manual_reminder"),
            NotificationKind::EddRequest => write!(f, "edd_request"),
        }
    }
}

/// Message handed to the notification sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient: String,
    pub run_id: RunId,
    pub stage: Stage,
    pub token: String,
    pub approve_url: String,
    pub reject_url: String,
    #[serde(default)]
    pub checkpoint_metadata: Value,
}

impl Notification {
    /// Build a notification with decision links rooted at `base_url`
    pub fn new(
        kind: NotificationKind,
        recipient: impl Into<String>,
        run_id: RunId,
        stage: Stage,
        token: impl Into<String>,
        base_url: &str,
        checkpoint_metadata: Value,
    ) -> Self {
        let token = token.into();
        Self {
            kind,
            recipient: recipient.into(),
            run_id,
            stage,
            approve_url: decision_link(base_url, stage, &token, "approve"),
            reject_url: decision_link(base_url, stage, &token, "reject"),
            token,
            checkpoint_metadata,
        }
    }
}

/// Submit endpoint path serving `stage`
pub fn submit_path(stage: Stage) -> &'static str {
    match stage {
        Stage::Stage1 => "/approvals/submit",
        Stage::Edd => "/edd/submit",
    }
}

/// Emailed link that submits `action` for `token`
///
/// Tokens are base64url, so they go into the query string unescaped.
pub fn decision_link(base_url: &str, stage: Stage, token: &str, action: &str) -> String {
    format!(
        "{}{}?token={}&action={}",
        base_url.trim_end_matches('/'),
        submit_path(stage),
        token,
        action
    )
}

/// Notification delivery errors
#[derive(Debug, Error)]
pub enum NotificationError {
    /// No answer within the deadline; the message may still have been sent
    #[error("notification timed out after {0:?}")]
    TimedOut(Duration),

    #[error("notification transport failed: {0}")]
    Transport(String),

    #[error("notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Notification sender
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Send with a deadline
pub async fn send_bounded(
    notifier: &dyn Notifier,
    notification: &Notification,
    deadline: Duration,
) -> Result<(), NotificationError> {
    match tokio::time::timeout(deadline, notifier.send(notification)).await {
        Ok(result) => result,
        Err(_) => Err(NotificationError::TimedOut(deadline)),
    }
}

/// Notifier that only logs; used in development and when no relay is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        tracing::info!(
            kind = %notification.kind,
            run_id = %notification.run_id,
            stage = %notification.stage,
            recipient = %notification.recipient,
            approve_url = %notification.approve_url,
            "Notification (log only)"
        );
        Ok(())
    }
}

/// Notifier posting each notification as JSON to a mail relay
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotificationError::Transport(format!("relay timed out: {}", e))
                } else {
                    NotificationError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(
            kind = %notification.kind,
            run_id = %notification.run_id,
            "Notification accepted by relay"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    struct Stalled;

    #[async_trait]
    impl Notifier for Stalled {
        async fn send(&self, _notification: &Notification) -> Result<(), NotificationError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn notification(stage: Stage) -> Notification {
        Notification::new(
            NotificationKind::ApprovalRequest,
            "reviewer@example.com",
            Uuid::new_v4(),
            stage,
            "abc_DEF-123",
            "https://review.example.com/",
            json!({"title": "Vendor onboarding"}),
        )
    }

    #[test]
    fn test_links_point_at_stage_endpoint() {
        let stage1 = notification(Stage::Stage1);
        assert_eq!(
            stage1.approve_url,
            "https://review.example.com/approvals/submit?token=abc_DEF-123&action=approve"
        );
        assert_eq!(
            stage1.reject_url,
            "https://review.example.com/approvals/submit?token=abc_DEF-123&action=reject"
        );

        let edd = notification(Stage::Edd);
        assert!(edd.approve_url.starts_with("https://review.example.com/edd/submit?"));
    }

    #[test]
    fn test_notification_wire_shape() {
        let value = serde_json::to_value(notification(Stage::Edd)).unwrap();
        assert_eq!(value["kind"], json!("approval_request"));
        assert_eq!(value["stage"], json!("edd"));
        assert_eq!(value["checkpoint_metadata"]["title"], json!("Vendor onboarding"));
    }

    #[tokio::test]
    async fn test_log_notifier_succeeds() {
        assert!(LogNotifier.send(&notification(Stage::Stage1)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_bounded_times_out() {
        let err = send_bounded(&Stalled, &notification(Stage::Stage1), Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::TimedOut(d) if d == Duration::from_secs(10)));
    }
}
