//! SLA notification seam
//!
//! The engine calls a notifier only after the tracker write that caused the
//! event has committed. A notifier failure is logged and never rolls the
//! tracker back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gryork_core::{CaseStatus, SlaTracker};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// What happened to a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlaEvent {
    /// First (level 1) or second (level 2) reminder
    Reminder { level: u8 },
    Escalation,
    Dormant,
}

impl SlaEvent {
    pub fn label(&self) -> &'static str {
        match self {
            SlaEvent::Reminder { level: 1 } => "first reminder",
            SlaEvent::Reminder { .. } => "second reminder",
            SlaEvent::Escalation => "escalation",
            SlaEvent::Dormant => "dormant",
        }
    }
}

/// Notification payload handed to a [`SlaNotifier`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaNotification {
    pub event: SlaEvent,
    pub tracker_id: String,
    pub case_id: String,
    pub stage: Option<CaseStatus>,
    pub sla_class: String,
    /// The deadline that was crossed
    pub due: DateTime<Utc>,
    pub at: DateTime<Utc>,
}

impl SlaNotification {
    pub fn new(event: SlaEvent, tracker: &SlaTracker, at: DateTime<Utc>) -> Self {
        let due = match event {
            SlaEvent::Reminder { level: 1 } => tracker.first_reminder_due,
            SlaEvent::Reminder { .. } => tracker.second_reminder_due,
            SlaEvent::Escalation => tracker.escalation_due,
            SlaEvent::Dormant => tracker.dormant_due,
        };
        Self {
            event,
            tracker_id: tracker.id.clone(),
            case_id: tracker.case_id.clone(),
            stage: tracker.stage,
            sla_class: tracker.sla_class.clone(),
            due,
            at,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification channel closed")]
    ChannelClosed,

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Outbound reminder / escalation delivery
#[async_trait]
pub trait SlaNotifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, notification: &SlaNotification) -> Result<(), NotifyError>;
}

/// Writes every notification to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl SlaNotifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, notification: &SlaNotification) -> Result<(), NotifyError> {
        match notification.event {
            SlaEvent::Escalation | SlaEvent::Dormant => tracing::warn!(
                tracker_id = %notification.tracker_id,
                case_id = %notification.case_id,
                sla_class = %notification.sla_class,
                due = %notification.due,
                "SLA {}",
                notification.event.label()
            ),
            SlaEvent::Reminder { .. } => tracing::info!(
                tracker_id = %notification.tracker_id,
                case_id = %notification.case_id,
                sla_class = %notification.sla_class,
                due = %notification.due,
                "SLA {}",
                notification.event.label()
            ),
        }
        Ok(())
    }
}

/// Forwards notifications into an unbounded channel
///
/// Lets another task (or a test) consume exactly what the engine emitted.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<SlaNotification>,
}

impl ChannelNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SlaNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl SlaNotifier for ChannelNotifier {
    fn name(&self) -> &str {
        "channel"
    }

    async fn notify(&self, notification: &SlaNotification) -> Result<(), NotifyError> {
        self.tx
            .send(notification.clone())
            .map_err(|_| NotifyError::ChannelClosed)
    }
}
