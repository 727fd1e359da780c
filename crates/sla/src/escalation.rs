//! Pure tracker state steps
//!
//! Nothing here touches storage or the clock; the engine loads a tracker,
//! applies a step at a given instant and persists the result.

use chrono::{DateTime, Utc};
use gryork_core::{
    LifecycleError, LifecycleResult, MilestoneKey, MilestoneStatus, SlaStatus, SlaTracker,
};

use crate::notifier::SlaEvent;

/// Outcome of one [`advance`] call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Advance {
    /// Status changes, in the order they were applied
    pub events: Vec<SlaEvent>,
    /// Milestones newly marked overdue
    pub overdue: Vec<MilestoneKey>,
}

impl Advance {
    /// Whether the tracker needs to be written back
    pub fn changed(&self) -> bool {
        !self.events.is_empty() || !self.overdue.is_empty()
    }
}

/// Apply every escalation step due at `now`
///
/// Steps run in order against the updated status, so one late tick can
/// carry a tracker through several of them. Calling again with the same
/// `now` changes nothing.
pub fn advance(tracker: &mut SlaTracker, now: DateTime<Utc>) -> Advance {
    let mut result = Advance::default();
    if !tracker.status.is_running() {
        return result;
    }

    result.overdue = tracker.mark_overdue(now);

    if tracker.status == SlaStatus::Active
        && now >= tracker.first_reminder_due
        && !tracker.any_milestone_completed()
    {
        tracker.status = SlaStatus::Reminder1Sent;
        result.events.push(SlaEvent::Reminder { level: 1 });
    }

    if tracker.status == SlaStatus::Reminder1Sent && now >= tracker.second_reminder_due {
        tracker.status = SlaStatus::Reminder2Sent;
        result.events.push(SlaEvent::Reminder { level: 2 });
    }

    if tracker.status == SlaStatus::Reminder2Sent && now >= tracker.escalation_due {
        tracker.status = SlaStatus::Escalated;
        tracker.escalated_at = Some(now);
        result.events.push(SlaEvent::Escalation);
    }

    if tracker.status.is_running() && now >= tracker.dormant_due {
        tracker.status = SlaStatus::Dormant;
        result.events.push(SlaEvent::Dormant);
    }

    if result.changed() {
        tracker.updated_at = now;
    }
    result
}

/// Complete one open milestone; late if `now` is past its target
///
/// Completing `day14` completes the tracker.
pub fn complete_milestone(
    tracker: &mut SlaTracker,
    key: MilestoneKey,
    completed_by: &str,
    now: DateTime<Utc>,
) -> LifecycleResult<MilestoneStatus> {
    if tracker.status.is_terminal() {
        return Err(LifecycleError::InvalidStage(format!(
            "SLA tracker {} is {}",
            tracker.id, tracker.status
        )));
    }

    let milestone = tracker.milestone_mut(key);
    if !milestone.status.is_open() {
        return Err(LifecycleError::InvalidStage(format!(
            "milestone {} is already {}",
            key, milestone.status
        )));
    }

    let status = if now <= milestone.target_date {
        MilestoneStatus::Completed
    } else {
        MilestoneStatus::CompletedLate
    };
    milestone.status = status;
    milestone.completed_at = Some(now);
    milestone.completed_by = Some(completed_by.to_string());

    if key == MilestoneKey::Day14 {
        tracker.status = SlaStatus::Completed;
    }
    tracker.updated_at = now;
    Ok(status)
}

/// Close a tracker whose stage has been left: settle every open milestone
/// and mark the tracker `COMPLETED`
pub fn close(tracker: &mut SlaTracker, closed_by: &str, now: DateTime<Utc>) -> bool {
    if tracker.status.is_terminal() {
        return false;
    }
    for m in tracker.milestones.iter_mut().filter(|m| m.status.is_open()) {
        m.status = if now <= m.target_date {
            MilestoneStatus::Completed
        } else {
            MilestoneStatus::CompletedLate
        };
        m.completed_at = Some(now);
        m.completed_by = Some(closed_by.to_string());
    }
    tracker.status = SlaStatus::Completed;
    tracker.updated_at = now;
    true
}

/// Cancel a non-terminal tracker
pub fn cancel(tracker: &mut SlaTracker, now: DateTime<Utc>) -> bool {
    if !tracker.status.can_advance_to(SlaStatus::Cancelled) {
        return false;
    }
    tracker.status = SlaStatus::Cancelled;
    tracker.updated_at = now;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use gryork_core::{CaseStatus, SlaEntityType};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 2, 10, 0, 0).unwrap()
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

    fn days(d: i64) -> DateTime<Utc> {
        t0() + Duration::days(d) + Duration::seconds(1)
    }

    #[test]
    fn test_nothing_due_before_first_deadline() {
        let mut t = tracker();
        let result = advance(&mut t, t0() + Duration::days(2));
        assert!(!result.changed());
        assert_eq!(t.status, SlaStatus::Active);
    }

    #[test]
    fn test_reminders_in_order() {
        let mut t = tracker();

        let r = advance(&mut t, days(3));
        assert_eq!(r.events, vec![SlaEvent::Reminder { level: 1 }]);
        assert_eq!(r.overdue, vec![MilestoneKey::Day3]);
        assert_eq!(t.status, SlaStatus::Reminder1Sent);

        let r = advance(&mut t, days(7));
        assert_eq!(r.events, vec![SlaEvent::Reminder { level: 2 }]);

        let r = advance(&mut t, days(10));
        assert_eq!(r.events, vec![SlaEvent::Escalation]);
        assert_eq!(t.escalated_at, Some(days(10)));
        assert_eq!(t.milestone(MilestoneKey::Day10).status, MilestoneStatus::Overdue);

        let r = advance(&mut t, days(14));
        assert_eq!(r.events, vec![SlaEvent::Dormant]);
        assert_eq!(t.status, SlaStatus::Dormant);
    }

    #[test]
    fn test_late_tick_cascades() {
        let mut t = tracker();
        let r = advance(&mut t, days(14));
        assert_eq!(
            r.events,
            vec![
                SlaEvent::Reminder { level: 1 },
                SlaEvent::Reminder { level: 2 },
                SlaEvent::Escalation,
                SlaEvent::Dormant
            ]
        );
        assert_eq!(r.overdue.len(), 4);
        assert_eq!(t.status, SlaStatus::Dormant);
    }

    #[test]
    fn test_advance_is_idempotent() {
        let mut t = tracker();
        advance(&mut t, days(7));
        let snapshot = t.clone();

        let again = advance(&mut t, days(7));
        assert!(!again.changed());
        assert_eq!(t, snapshot);
    }

    #[test]
    fn test_first_reminder_skipped_once_a_milestone_is_done() {
        let mut t = tracker();
        complete_milestone(&mut t, MilestoneKey::Day3, "rmt-1", t0() + Duration::days(1)).unwrap();

        let r = advance(&mut t, days(3));
        assert!(r.events.is_empty());
        assert_eq!(t.status, SlaStatus::Active);

        // Dormancy still applies to any running tracker
        let r = advance(&mut t, days(14));
        assert_eq!(r.events, vec![SlaEvent::Dormant]);
    }

    #[test]
    fn test_complete_on_time_and_late() {
        let mut t = tracker();
        let on_time =
            complete_milestone(&mut t, MilestoneKey::Day3, "rmt-1", t0() + Duration::days(3))
                .unwrap();
        assert_eq!(on_time, MilestoneStatus::Completed);

        advance(&mut t, days(8));
        assert_eq!(t.milestone(MilestoneKey::Day7).status, MilestoneStatus::Overdue);
        let late = complete_milestone(&mut t, MilestoneKey::Day7, "rmt-1", days(8)).unwrap();
        assert_eq!(late, MilestoneStatus::CompletedLate);
        assert_eq!(
            t.milestone(MilestoneKey::Day7).completed_by.as_deref(),
            Some("rmt-1")
        );

        let again = complete_milestone(&mut t, MilestoneKey::Day7, "rmt-1", days(8));
        assert!(matches!(again, Err(LifecycleError::InvalidStage(_))));
    }

    #[test]
    fn test_day14_completes_tracker() {
        let mut t = tracker();
        complete_milestone(&mut t, MilestoneKey::Day14, "ops-1", days(1)).unwrap();
        assert_eq!(t.status, SlaStatus::Completed);

        let r = complete_milestone(&mut t, MilestoneKey::Day3, "ops-1", days(2));
        assert!(matches!(r, Err(LifecycleError::InvalidStage(_))));
        assert!(!advance(&mut t, days(20)).changed());
    }

    #[test]
    fn test_close_and_cancel() {
        let mut t = tracker();
        advance(&mut t, days(4));
        assert!(close(&mut t, "ops-1", days(4)));
        assert_eq!(t.status, SlaStatus::Completed);
        assert_eq!(t.milestone(MilestoneKey::Day3).status, MilestoneStatus::CompletedLate);
        assert_eq!(t.milestone(MilestoneKey::Day7).status, MilestoneStatus::Completed);
        assert!(!close(&mut t, "ops-1", days(5)));
        assert!(!cancel(&mut t, days(5)));

        let mut dormant = tracker();
        advance(&mut dormant, days(15));
        assert!(cancel(&mut dormant, days(15)));
        assert_eq!(dormant.status, SlaStatus::Cancelled);
    }
}
