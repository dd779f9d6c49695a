//! Approval services
//!
//! Business logic of the approval checkpoint subsystem, independent of HTTP:
//!
//! ```text
//!   PauseService ──────────┐
//!   DecisionFinalizer ─────┤     ApprovalContext
//!   ReminderScheduler ─────┼──▶  store · tokens · notifier · clock · settings
//!   status::project (pure) ┘
//! ```
//!
//! Every operation follows the same ordering rule: state is persisted with a
//! compare-and-swap save first, and only then is a notification sent.

pub mod clock;
pub mod decision;
pub mod error;
pub mod notifier;
pub mod pause;
pub mod reminder;
pub mod status;
pub mod trigger;

use chrono::Duration;
use hitl_checkpoint::{CheckpointStore, RunId, TokenRegistry};
use std::sync::Arc;

pub use clock::{Clock, ManualClock, SystemClock};
pub use decision::{DecisionFinalizer, DecisionResult, Submission};
pub use error::{ApprovalError, ApprovalResult};
pub use notifier::{
    send_bounded, LogNotifier, Notification, NotificationError, NotificationKind, Notifier,
    WebhookNotifier,
};
pub use pause::{PauseOutcome, PauseRequest, PauseService};
pub use reminder::{ManualReminderReceipt, ReminderCheck, ReminderScheduler};
pub use status::{project, ApprovalStatus, StatusView};
pub use trigger::is_escalation_trigger;

/// Tunables shared by the approval services
#[derive(Debug, Clone)]
pub struct ApprovalSettings {
    /// Delay between the approval request and the automatic reminder
    pub reminder_delay: Duration,
    /// Minimum time between a reminder and a manual reminder
    pub reminder_cooldown: Duration,
    /// Minimum rejection comment length, in characters after trimming
    pub min_comment_chars: usize,
    /// Recipient used when a pause request names none
    pub fallback_recipient: Option<String>,
    /// Recipient of enhanced due diligence requests
    pub edd_recipient: Option<String>,
    /// Root of the emailed decision links
    pub base_url: String,
    /// Deadline for a single notification send
    pub notify_timeout: std::time::Duration,
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self {
            reminder_delay: Duration::seconds(180),
            reminder_cooldown: Duration::seconds(300),
            min_comment_chars: 10,
            fallback_recipient: None,
            edd_recipient: None,
            base_url: "http://127.0.0.1:8080".to_string(),
            notify_timeout: std::time::Duration::from_secs(10),
        }
    }
}

/// Collaborators shared by every approval service
#[derive(Clone)]
pub struct ApprovalContext {
    pub store: Arc<dyn CheckpointStore>,
    pub tokens: Arc<dyn TokenRegistry>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub settings: Arc<ApprovalSettings>,
}

impl ApprovalContext {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        tokens: Arc<dyn TokenRegistry>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: ApprovalSettings,
    ) -> Self {
        Self {
            store,
            tokens,
            notifier,
            clock,
            settings: Arc::new(settings),
        }
    }

    /// Send a notification whose intent is already persisted
    ///
    /// Returns the failure as a warning string; the caller's state change
    /// stands either way.
    pub(crate) async fn dispatch(&self, notification: &Notification) -> Option<String> {
        match send_bounded(
            self.notifier.as_ref(),
            notification,
            self.settings.notify_timeout,
        )
        .await
        {
            Ok(()) => {
                tracing::info!(
                    kind = %notification.kind,
                    run_id = %notification.run_id,
                    recipient = %notification.recipient,
                    "Notification sent"
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    kind = %notification.kind,
                    run_id = %notification.run_id,
                    error = %e,
                    "Notification failed; state already committed"
                );
                Some(e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for ApprovalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalContext")
            .field("clock", &self.clock)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Facade over the approval services used by the HTTP layer
#[derive(Debug, Clone)]
pub struct ApprovalService {
    ctx: ApprovalContext,
    pause: PauseService,
    finalizer: DecisionFinalizer,
    reminders: ReminderScheduler,
}

impl ApprovalService {
    pub fn new(ctx: ApprovalContext) -> Self {
        Self {
            pause: PauseService::new(ctx.clone()),
            finalizer: DecisionFinalizer::new(ctx.clone()),
            reminders: ReminderScheduler::new(ctx.clone()),
            ctx,
        }
    }

    pub fn context(&self) -> &ApprovalContext {
        &self.ctx
    }

    pub fn settings(&self) -> &ApprovalSettings {
        &self.ctx.settings
    }

    /// Open a checkpoint for a paused run
    pub async fn pause(&self, request: PauseRequest) -> ApprovalResult<PauseOutcome> {
        self.pause.pause(request).await
    }

    /// Apply a decision for `stage`
    pub async fn submit(
        &self,
        stage: hitl_checkpoint::Stage,
        submission: Submission,
    ) -> ApprovalResult<DecisionResult> {
        self.finalizer.submit(stage, submission).await
    }

    /// Poll a run: send a due reminder, then project its status
    pub async fn poll(&self, run_id: &RunId) -> ApprovalResult<StatusView> {
        let check = self.reminders.run_due(run_id).await?;
        let mut view = project(
            &check.checkpoint,
            self.ctx.clock.now(),
            self.ctx.settings.reminder_delay,
        );
        view.reminder_warning = check.warning;
        Ok(view)
    }

    /// Send a manual reminder, subject to the cooldown
    pub async fn remind(&self, run_id: &RunId) -> ApprovalResult<ManualReminderReceipt> {
        self.reminders.remind(run_id).await
    }
}
