//! SLA tracker records
//!
//! One tracker follows a bounded activity (a case stage, or a KYC
//! sub-entity) through four fixed milestones. Deadlines are derived once
//! from the class offsets and only recomputed by an explicit restart.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::status::CaseStatus;

/// The four fixed checkpoints, in order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumString,
    Display, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MilestoneKey {
    Day3,
    Day7,
    Day10,
    Day14,
}

impl MilestoneKey {
    pub const ALL: [MilestoneKey; 4] = [
        MilestoneKey::Day3,
        MilestoneKey::Day7,
        MilestoneKey::Day10,
        MilestoneKey::Day14,
    ];

    pub fn index(&self) -> usize {
        match self {
            MilestoneKey::Day3 => 0,
            MilestoneKey::Day7 => 1,
            MilestoneKey::Day10 => 2,
            MilestoneKey::Day14 => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
    IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MilestoneStatus {
    Pending,
    Completed,
    CompletedLate,
    Overdue,
}

impl MilestoneStatus {
    /// Still waiting for an actor (pending or already overdue)
    pub fn is_open(&self) -> bool {
        matches!(self, MilestoneStatus::Pending | MilestoneStatus::Overdue)
    }
}

/// Tracker state. Advances forward only; `COMPLETED` and `CANCELLED` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter,
    IntoStaticStr,
)]
pub enum SlaStatus {
    #[serde(rename = "ACTIVE")]
    #[strum(serialize = "ACTIVE")]
    Active,
    #[serde(rename = "REMINDER_1_SENT")]
    #[strum(serialize = "REMINDER_1_SENT")]
    Reminder1Sent,
    #[serde(rename = "REMINDER_2_SENT")]
    #[strum(serialize = "REMINDER_2_SENT")]
    Reminder2Sent,
    #[serde(rename = "ESCALATED")]
    #[strum(serialize = "ESCALATED")]
    Escalated,
    #[serde(rename = "DORMANT")]
    #[strum(serialize = "DORMANT")]
    Dormant,
    #[serde(rename = "COMPLETED")]
    #[strum(serialize = "COMPLETED")]
    Completed,
    #[serde(rename = "CANCELLED")]
    #[strum(serialize = "CANCELLED")]
    Cancelled,
}

impl SlaStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SlaStatus::Completed | SlaStatus::Cancelled)
    }

    /// Open and still driven by the tick (dormant trackers are left alone)
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            SlaStatus::Active
                | SlaStatus::Reminder1Sent
                | SlaStatus::Reminder2Sent
                | SlaStatus::Escalated
        )
    }

    /// Whether `next` is a legal forward move from `self`
    pub fn can_advance_to(&self, next: SlaStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            SlaStatus::Active => false,
            SlaStatus::Reminder1Sent => *self == SlaStatus::Active,
            SlaStatus::Reminder2Sent => *self == SlaStatus::Reminder1Sent,
            SlaStatus::Escalated => *self == SlaStatus::Reminder2Sent,
            SlaStatus::Dormant => self.is_running(),
            SlaStatus::Completed | SlaStatus::Cancelled => true,
        }
    }
}

/// What a tracker is attached to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
    IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlaEntityType {
    Case,
    Kyc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub key: MilestoneKey,
    pub target_date: DateTime<Utc>,
    pub status: MilestoneStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaTracker {
    pub id: String,
    pub case_id: String,
    pub entity_type: SlaEntityType,
    pub entity_id: String,
    /// Case stage this tracker times, if it follows a case stage
    pub stage: Option<CaseStatus>,
    pub sla_class: String,
    pub milestones: Vec<Milestone>,
    pub status: SlaStatus,
    pub first_reminder_due: DateTime<Utc>,
    pub second_reminder_due: DateTime<Utc>,
    pub escalation_due: DateTime<Utc>,
    pub dormant_due: DateTime<Utc>,
    pub escalated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl SlaTracker {
    /// Create an `ACTIVE` tracker with deadlines derived from `offsets_days`
    ///
    /// Offsets must be strictly increasing; the SLA class validates that
    /// before it gets here.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        case_id: String,
        entity_type: SlaEntityType,
        entity_id: String,
        stage: Option<CaseStatus>,
        sla_class: String,
        offsets_days: [u32; 4],
        now: DateTime<Utc>,
    ) -> Self {
        let mut tracker = Self {
            id,
            case_id,
            entity_type,
            entity_id,
            stage,
            sla_class,
            milestones: Vec::with_capacity(4),
            status: SlaStatus::Active,
            first_reminder_due: now,
            second_reminder_due: now,
            escalation_due: now,
            dormant_due: now,
            escalated_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        tracker.schedule(offsets_days, now);
        tracker
    }

    /// (Re)compute milestones and derived deadlines from `start`
    pub fn schedule(&mut self, offsets_days: [u32; 4], start: DateTime<Utc>) {
        self.milestones = MilestoneKey::ALL
            .iter()
            .zip(offsets_days)
            .map(|(key, days)| Milestone {
                key: *key,
                target_date: start + Duration::days(days as i64),
                status: MilestoneStatus::Pending,
                completed_at: None,
                completed_by: None,
            })
            .collect();
        self.first_reminder_due = self.milestones[0].target_date;
        self.second_reminder_due = self.milestones[1].target_date;
        self.escalation_due = self.milestones[2].target_date;
        self.dormant_due = self.milestones[3].target_date;
        self.status = SlaStatus::Active;
        self.escalated_at = None;
        self.updated_at = start;
    }

    pub fn milestone(&self, key: MilestoneKey) -> &Milestone {
        &self.milestones[key.index()]
    }

    pub fn milestone_mut(&mut self, key: MilestoneKey) -> &mut Milestone {
        &mut self.milestones[key.index()]
    }

    /// True once any milestone has been completed (on time or late)
    pub fn any_milestone_completed(&self) -> bool {
        self.milestones.iter().any(|m| !m.status.is_open())
    }

    /// Mark every still-pending milestone whose target has passed as overdue.
    /// Returns the keys that changed.
    pub fn mark_overdue(&mut self, now: DateTime<Utc>) -> Vec<MilestoneKey> {
        let mut changed = Vec::new();
        for m in &mut self.milestones {
            if m.status == MilestoneStatus::Pending && now >= m.target_date {
                m.status = MilestoneStatus::Overdue;
                changed.push(m.key);
            }
        }
        changed
    }

    /// At least one milestone is overdue, or the tracker has escalated
    pub fn is_overdue(&self) -> bool {
        self.status == SlaStatus::Escalated
            || self
                .milestones
                .iter()
                .any(|m| m.status == MilestoneStatus::Overdue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap()
    }

    fn tracker() -> SlaTracker {
        SlaTracker::new(
            "SLA-1".to_string(),
            "case-1".to_string(),
            SlaEntityType::Case,
            "case-1".to_string(),
            Some(CaseStatus::RmtQueue),
            "RMT_REVIEW".to_string(),
            [3, 7, 10, 14],
            t0(),
        )
    }

    #[test]
    fn test_deadlines_derived_from_offsets() {
        let t = tracker();
        assert_eq!(t.first_reminder_due, t0() + Duration::days(3));
        assert_eq!(t.second_reminder_due, t0() + Duration::days(7));
        assert_eq!(t.escalation_due, t0() + Duration::days(10));
        assert_eq!(t.dormant_due, t0() + Duration::days(14));
        assert!(t
            .milestones
            .windows(2)
            .all(|w| w[0].target_date < w[1].target_date));
        assert_eq!(t.status, SlaStatus::Active);
    }

    #[test]
    fn test_status_only_moves_forward() {
        use SlaStatus::*;
        assert!(Active.can_advance_to(Reminder1Sent));
        assert!(!Active.can_advance_to(Reminder2Sent));
        assert!(!Reminder2Sent.can_advance_to(Reminder1Sent));
        assert!(Escalated.can_advance_to(Dormant));
        assert!(Dormant.can_advance_to(Completed));
        assert!(!Dormant.can_advance_to(Escalated));
        assert!(!Completed.can_advance_to(Cancelled));
        assert!(!Cancelled.can_advance_to(Completed));
    }

    #[test]
    fn test_mark_overdue() {
        let mut t = tracker();
        let changed = t.mark_overdue(t0() + Duration::days(8));
        assert_eq!(changed, vec![MilestoneKey::Day3, MilestoneKey::Day7]);
        assert!(t.is_overdue());
        assert!(t.mark_overdue(t0() + Duration::days(8)).is_empty());
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(SlaStatus::Reminder1Sent.as_str(), "REMINDER_1_SENT");
        assert_eq!(
            serde_json::to_string(&SlaStatus::Reminder2Sent).unwrap(),
            "\"REMINDER_2_SENT\""
        );
        assert_eq!(MilestoneKey::Day14.as_str(), "day14");
        assert_eq!(
            serde_json::to_string(&MilestoneStatus::CompletedLate).unwrap(),
            "\"COMPLETED_LATE\""
        );
    }
}
