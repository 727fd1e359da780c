//! Audit rows

use chrono::{DateTime, Utc};
use gryork_core::{Actor, Role};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};

/// User id recorded for automatic (scheduler) actions
pub const SYSTEM_USER: &str = "system";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumString,
    Display, IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    Case,
    Sla,
    Bid,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumString,
    Display, IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    CaseCreated,
    CaseStatusChanged,
    CaseMarkedDormant,
    SlaTrackerStarted,
    SlaReminderSent,
    SlaEscalated,
    SlaDormant,
    SlaMilestoneCompleted,
    SlaTrackerCompleted,
    SlaTrackerCancelled,
    SlaTrackerRestarted,
    BidPlaced,
    BidWithdrawn,
    BidAccepted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn category(&self) -> AuditCategory {
        use AuditAction::*;
        match self {
            CaseCreated | CaseStatusChanged | CaseMarkedDormant => AuditCategory::Case,
            SlaTrackerStarted | SlaReminderSent | SlaEscalated | SlaDormant
            | SlaMilestoneCompleted | SlaTrackerCompleted | SlaTrackerCancelled
            | SlaTrackerRestarted => AuditCategory::Sla,
            BidPlaced | BidWithdrawn | BidAccepted => AuditCategory::Bid,
        }
    }
}

/// One immutable audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub user_id: String,
    /// `None` for automatic actions taken by the system
    pub user_role: Option<Role>,
    pub action: AuditAction,
    pub category: AuditCategory,
    pub entity_type: String,
    pub entity_id: String,
    pub description: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// A successful action by an authenticated actor
    pub fn new(
        actor: &Actor,
        action: AuditAction,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        description: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self::build(
            actor.user_id.clone(),
            Some(actor.role),
            action,
            entity_type.into(),
            entity_id.into(),
            description.into(),
            at,
        )
    }

    /// A successful automatic action
    pub fn system(
        action: AuditAction,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        description: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self::build(
            SYSTEM_USER.to_string(),
            None,
            action,
            entity_type.into(),
            entity_id.into(),
            description.into(),
            at,
        )
    }

    fn build(
        user_id: String,
        user_role: Option<Role>,
        action: AuditAction,
        entity_type: String,
        entity_id: String,
        description: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            user_role,
            action,
            category: action.category(),
            entity_type,
            entity_id,
            description,
            success: true,
            error_message: None,
            created_at,
        }
    }

    /// Mark as a rejected attempt
    pub fn failed(mut self, error_message: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(error_message.into());
        self
    }
}
