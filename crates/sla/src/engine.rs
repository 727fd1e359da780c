//! SLA engine - tracker lifecycle and the escalation tick

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use gryork_audit::{AuditAction, AuditEntry, AuditRecorder};
use gryork_core::{
    Actor, Case, CaseStatus, Clock, LifecycleError, LifecycleResult, MilestoneKey,
    MilestoneStatus, SlaEntityType, SlaStatus, SlaTracker,
};
use gryork_store::{Store, StoreError, TrackerFilter};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::class::SlaConfig;
use crate::escalation::{self, Advance};
use crate::notifier::{SlaEvent, SlaNotification, SlaNotifier};

const ENTITY: &str = "sla_tracker";

/// Reload-and-reapply attempts for internal tracker updates
const MAX_ATTEMPTS: usize = 3;

const RUNNING: [SlaStatus; 4] = [
    SlaStatus::Active,
    SlaStatus::Reminder1Sent,
    SlaStatus::Reminder2Sent,
    SlaStatus::Escalated,
];

/// Result of one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub examined: usize,
    pub advanced: usize,
    pub reminders: usize,
    pub escalations: usize,
    pub dormant: usize,
    pub overdue_marked: usize,
    /// Trackers another writer changed first
    pub skipped: usize,
    pub failures: Vec<TickFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickFailure {
    pub tracker_id: String,
    pub error: String,
}

/// Aggregate view over all trackers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaDashboard {
    pub total: usize,
    pub running: usize,
    pub by_status: BTreeMap<String, usize>,
    pub overdue: usize,
    pub escalated: usize,
    pub dormant: usize,
    /// Running trackers with an open milestone due in the next 24 hours
    pub due_within_24h: usize,
    pub generated_at: DateTime<Utc>,
}

enum TickOutcome {
    Unchanged,
    Superseded,
    Advanced(Advance),
}

/// Owns every tracker state change
pub struct SlaEngine {
    store: Arc<dyn Store>,
    audit: Arc<AuditRecorder>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn SlaNotifier>,
    config: SlaConfig,
}

impl SlaEngine {
    pub fn new(
        store: Arc<dyn Store>,
        audit: Arc<AuditRecorder>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn SlaNotifier>,
        config: SlaConfig,
    ) -> LifecycleResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            audit,
            clock,
            notifier,
            config,
        })
    }

    pub fn config(&self) -> &SlaConfig {
        &self.config
    }

    /// Start the tracker for a case stage, if that stage is tracked
    ///
    /// Idempotent: an open tracker for the same case and stage is returned
    /// as is.
    pub fn activate_stage(
        &self,
        case: &Case,
        stage: CaseStatus,
        actor: &Actor,
    ) -> LifecycleResult<Option<SlaTracker>> {
        let Some(class) = self.config.class_for_stage(stage) else {
            return Ok(None);
        };

        let existing = self
            .store
            .list_trackers(&TrackerFilter::for_case(&case.id))?
            .into_iter()
            .find(|t| t.stage == Some(stage) && !t.status.is_terminal());
        if let Some(tracker) = existing {
            tracing::debug!(
                tracker_id = %tracker.id,
                case_id = %case.id,
                stage = %stage,
                "SLA tracker already active"
            );
            return Ok(Some(tracker));
        }

        let now = self.clock.now();
        let tracker = SlaTracker::new(
            new_tracker_id(),
            case.id.clone(),
            SlaEntityType::Case,
            case.id.clone(),
            Some(stage),
            class.name.clone(),
            class.offsets_days,
            now,
        );
        let tracker = self.store.insert_tracker(&tracker)?;

        tracing::info!(
            tracker_id = %tracker.id,
            case_number = %case.case_number,
            stage = %stage,
            sla_class = %tracker.sla_class,
            "SLA tracker started"
        );
        self.audit.record(AuditEntry::new(
            actor,
            AuditAction::SlaTrackerStarted,
            ENTITY,
            &tracker.id,
            format!(
                "{} tracker started for {} at {}",
                tracker.sla_class, case.case_number, stage
            ),
            now,
        ));

        // The caller's snapshot may be stale; a transition that committed in
        // the meantime has already run its own cleanup and missed this tracker
        let current = self.store.get_case(&case.id)?;
        if current.version != case.version {
            if current.is_terminal() {
                tracing::warn!(
                    tracker_id = %tracker.id,
                    case_id = %case.id,
                    status = %current.status,
                    "Case closed while starting tracker"
                );
                self.cancel_for_case(&case.id, actor)?;
                return Ok(Some(self.store.get_tracker(&tracker.id)?));
            }
            if current.status != stage {
                tracing::warn!(
                    tracker_id = %tracker.id,
                    case_id = %case.id,
                    status = %current.status,
                    "Case left stage while starting tracker"
                );
                self.close_stage(&case.id, stage, actor)?;
                return Ok(Some(self.store.get_tracker(&tracker.id)?));
            }
        }
        Ok(Some(tracker))
    }

    /// Start a tracker outside the stage mapping (e.g. a KYC sub-entity)
    pub fn start_tracker(
        &self,
        case_id: &str,
        entity_type: SlaEntityType,
        entity_id: &str,
        sla_class: &str,
        actor: &Actor,
    ) -> LifecycleResult<SlaTracker> {
        if !actor.role.is_supervisor() {
            return Err(self.forbidden(
                actor,
                AuditAction::SlaTrackerStarted,
                "start an SLA tracker",
                case_id,
            ));
        }
        let class = self.config.class(sla_class).ok_or_else(|| {
            LifecycleError::Validation(format!("unknown SLA class {}", sla_class))
        })?;
        let case = self.store.get_case(case_id)?;
        if case.is_terminal() {
            return Err(LifecycleError::InvalidStage(format!(
                "case {} is {}",
                case.case_number, case.status
            )));
        }

        let now = self.clock.now();
        let tracker = SlaTracker::new(
            new_tracker_id(),
            case.id.clone(),
            entity_type,
            entity_id.to_string(),
            None,
            class.name.clone(),
            class.offsets_days,
            now,
        );
        let tracker = self.store.insert_tracker(&tracker)?;

        tracing::info!(
            tracker_id = %tracker.id,
            case_number = %case.case_number,
            entity_type = %entity_type,
            entity_id = %entity_id,
            "SLA tracker started"
        );
        self.audit.record(AuditEntry::new(
            actor,
            AuditAction::SlaTrackerStarted,
            ENTITY,
            &tracker.id,
            format!(
                "{} tracker started for {} {} on {}",
                tracker.sla_class, entity_type, entity_id, case.case_number
            ),
            now,
        ));
        Ok(tracker)
    }

    /// Mark one milestone done
    ///
    /// With `expected_version`, the call fails with `Conflict` if the
    /// tracker changed since the caller read it.
    pub fn complete_milestone(
        &self,
        tracker_id: &str,
        key: MilestoneKey,
        actor: &Actor,
        expected_version: Option<u64>,
    ) -> LifecycleResult<SlaTracker> {
        if !actor.role.is_internal() {
            return Err(self.forbidden(
                actor,
                AuditAction::SlaMilestoneCompleted,
                "complete SLA milestones",
                tracker_id,
            ));
        }

        let mut tracker = self.store.get_tracker(tracker_id)?;
        check_expected(&tracker, expected_version)?;

        let now = self.clock.now();
        let status = escalation::complete_milestone(&mut tracker, key, &actor.user_id, now)?;
        let tracker = self.store.update_tracker(&tracker)?;

        let late = if status == MilestoneStatus::CompletedLate {
            " (late)"
        } else {
            ""
        };
        tracing::info!(
            tracker_id = %tracker.id,
            milestone = %key,
            status = %status,
            "SLA milestone completed"
        );
        self.audit.record(AuditEntry::new(
            actor,
            AuditAction::SlaMilestoneCompleted,
            ENTITY,
            &tracker.id,
            format!("Milestone {} completed{}", key, late),
            now,
        ));
        if tracker.status == SlaStatus::Completed {
            self.audit.record(AuditEntry::new(
                actor,
                AuditAction::SlaTrackerCompleted,
                ENTITY,
                &tracker.id,
                format!("{} tracker completed", tracker.sla_class),
                now,
            ));
        }
        Ok(tracker)
    }

    /// Complete the open trackers of a stage the case has left
    pub fn close_stage(
        &self,
        case_id: &str,
        stage: CaseStatus,
        actor: &Actor,
    ) -> LifecycleResult<usize> {
        let open: Vec<SlaTracker> = self
            .store
            .list_trackers(&TrackerFilter::for_case(case_id))?
            .into_iter()
            .filter(|t| t.stage == Some(stage) && !t.status.is_terminal())
            .collect();

        let mut closed = 0;
        for tracker in open {
            let now = self.clock.now();
            let updated = self.update_with_retry(&tracker.id, |t| {
                escalation::close(t, &actor.user_id, now)
            })?;
            if let Some(t) = updated {
                closed += 1;
                tracing::info!(tracker_id = %t.id, stage = %stage, "SLA tracker completed");
                self.audit.record(AuditEntry::new(
                    actor,
                    AuditAction::SlaTrackerCompleted,
                    ENTITY,
                    &t.id,
                    format!("{} tracker completed on leaving {}", t.sla_class, stage),
                    now,
                ));
            }
        }
        Ok(closed)
    }

    /// Cancel every open tracker of a case (the case reached a terminal status)
    pub fn cancel_for_case(&self, case_id: &str, actor: &Actor) -> LifecycleResult<usize> {
        let open: Vec<SlaTracker> = self
            .store
            .list_trackers(&TrackerFilter::for_case(case_id))?
            .into_iter()
            .filter(|t| !t.status.is_terminal())
            .collect();

        let mut cancelled = 0;
        for tracker in open {
            let now = self.clock.now();
            if let Some(t) = self.update_with_retry(&tracker.id, |t| escalation::cancel(t, now))? {
                cancelled += 1;
                tracing::info!(tracker_id = %t.id, case_id = %case_id, "SLA tracker cancelled");
                self.audit.record(AuditEntry::new(
                    actor,
                    AuditAction::SlaTrackerCancelled,
                    ENTITY,
                    &t.id,
                    format!("{} tracker cancelled", t.sla_class),
                    now,
                ));
            }
        }
        Ok(cancelled)
    }

    /// Recompute all deadlines from now and return the tracker to `ACTIVE`
    pub fn restart(&self, tracker_id: &str, actor: &Actor) -> LifecycleResult<SlaTracker> {
        if !actor.role.is_supervisor() {
            return Err(self.forbidden(
                actor,
                AuditAction::SlaTrackerRestarted,
                "restart SLA trackers",
                tracker_id,
            ));
        }

        let mut tracker = self.store.get_tracker(tracker_id)?;
        if tracker.status.is_terminal() {
            return Err(LifecycleError::InvalidStage(format!(
                "SLA tracker {} is {}",
                tracker.id, tracker.status
            )));
        }
        let offsets = self
            .config
            .class(&tracker.sla_class)
            .map(|c| c.offsets_days)
            .ok_or_else(|| {
                LifecycleError::Validation(format!("unknown SLA class {}", tracker.sla_class))
            })?;

        let previous = tracker.status;
        let now = self.clock.now();
        tracker.schedule(offsets, now);
        let tracker = self.store.update_tracker(&tracker)?;

        tracing::info!(tracker_id = %tracker.id, previous = %previous, "SLA tracker restarted");
        self.audit.record(AuditEntry::new(
            actor,
            AuditAction::SlaTrackerRestarted,
            ENTITY,
            &tracker.id,
            format!("Restarted from {}", previous),
            now,
        ));
        Ok(tracker)
    }

    /// Advance every running tracker whose deadlines have passed
    ///
    /// One tracker failing does not stop the others; failures are
    /// collected in the report.
    pub async fn tick(&self) -> LifecycleResult<TickReport> {
        let now = self.clock.now();
        let trackers = self
            .store
            .list_trackers(&TrackerFilter::with_statuses(&RUNNING))?;

        let mut report = TickReport {
            examined: trackers.len(),
            ..Default::default()
        };

        for tracker in trackers {
            let tracker_id = tracker.id.clone();
            match self.advance_one(tracker, now).await {
                Ok(TickOutcome::Unchanged) => {}
                Ok(TickOutcome::Superseded) => report.skipped += 1,
                Ok(TickOutcome::Advanced(step)) => {
                    report.advanced += 1;
                    report.overdue_marked += step.overdue.len();
                    for event in step.events {
                        match event {
                            SlaEvent::Reminder { .. } => report.reminders += 1,
                            SlaEvent::Escalation => report.escalations += 1,
                            SlaEvent::Dormant => report.dormant += 1,
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(tracker_id = %tracker_id, error = %e, "SLA tick failed for tracker");
                    report.failures.push(TickFailure {
                        tracker_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        if report.advanced > 0 || !report.failures.is_empty() {
            tracing::info!(
                examined = report.examined,
                advanced = report.advanced,
                reminders = report.reminders,
                escalations = report.escalations,
                dormant = report.dormant,
                failures = report.failures.len(),
                "SLA tick complete"
            );
        }
        Ok(report)
    }

    async fn advance_one(
        &self,
        tracker: SlaTracker,
        now: DateTime<Utc>,
    ) -> LifecycleResult<TickOutcome> {
        let mut next = tracker;
        let step = escalation::advance(&mut next, now);
        if !step.changed() {
            return Ok(TickOutcome::Unchanged);
        }

        let stored = match self.store.update_tracker(&next) {
            Ok(stored) => stored,
            Err(StoreError::Conflict { .. }) => {
                tracing::debug!(tracker_id = %next.id, "SLA tracker changed concurrently, skipping");
                return Ok(TickOutcome::Superseded);
            }
            Err(e) => return Err(e.into()),
        };

        // Committed; now tell the world
        for event in &step.events {
            let notification = SlaNotification::new(*event, &stored, now);
            if let Err(e) = self.notifier.notify(&notification).await {
                tracing::warn!(
                    tracker_id = %stored.id,
                    notifier = self.notifier.name(),
                    error = %e,
                    "SLA notification failed"
                );
            }
            self.audit.record(AuditEntry::system(
                audit_action(event),
                ENTITY,
                &stored.id,
                format!(
                    "{} for {} (due {})",
                    event.label(),
                    stored.sla_class,
                    notification.due.to_rfc3339()
                ),
                now,
            ));
        }
        Ok(TickOutcome::Advanced(step))
    }

    pub fn get_tracker(&self, tracker_id: &str) -> LifecycleResult<SlaTracker> {
        Ok(self.store.get_tracker(tracker_id)?)
    }

    pub fn trackers_for_case(&self, case_id: &str) -> LifecycleResult<Vec<SlaTracker>> {
        Ok(self.store.list_trackers(&TrackerFilter::for_case(case_id))?)
    }

    /// Trackers still driven by the tick
    pub fn active(&self) -> LifecycleResult<Vec<SlaTracker>> {
        Ok(self
            .store
            .list_trackers(&TrackerFilter::with_statuses(&RUNNING))?)
    }

    /// Open trackers with an overdue milestone or an escalation
    pub fn overdue(&self) -> LifecycleResult<Vec<SlaTracker>> {
        Ok(self
            .store
            .list_trackers(&TrackerFilter::default())?
            .into_iter()
            .filter(|t| !t.status.is_terminal() && t.is_overdue())
            .collect())
    }

    pub fn dashboard(&self) -> LifecycleResult<SlaDashboard> {
        let now = self.clock.now();
        let horizon = now + Duration::hours(24);
        let trackers = self.store.list_trackers(&TrackerFilter::default())?;

        let mut by_status: BTreeMap<String, usize> = SlaStatus::iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut dashboard = SlaDashboard {
            total: trackers.len(),
            running: 0,
            by_status: BTreeMap::new(),
            overdue: 0,
            escalated: 0,
            dormant: 0,
            due_within_24h: 0,
            generated_at: now,
        };

        for t in &trackers {
            *by_status.entry(t.status.as_str().to_string()).or_insert(0) += 1;
            match t.status {
                SlaStatus::Escalated => dashboard.escalated += 1,
                SlaStatus::Dormant => dashboard.dormant += 1,
                _ => {}
            }
            if !t.status.is_terminal() && t.is_overdue() {
                dashboard.overdue += 1;
            }
            if t.status.is_running() {
                dashboard.running += 1;
                let due_soon = t.milestones.iter().any(|m| {
                    m.status == MilestoneStatus::Pending
                        && m.target_date > now
                        && m.target_date <= horizon
                });
                if due_soon {
                    dashboard.due_within_24h += 1;
                }
            }
        }

        dashboard.by_status = by_status;
        Ok(dashboard)
    }

    /// Reload, apply and write until the update lands or attempts run out.
    /// `apply` returning false means nothing to do.
    fn update_with_retry<F>(&self, tracker_id: &str, apply: F) -> LifecycleResult<Option<SlaTracker>>
    where
        F: Fn(&mut SlaTracker) -> bool,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut tracker = self.store.get_tracker(tracker_id)?;
            if !apply(&mut tracker) {
                return Ok(None);
            }
            match self.store.update_tracker(&tracker) {
                Ok(stored) => return Ok(Some(stored)),
                Err(e @ StoreError::Conflict { .. }) if attempt >= MAX_ATTEMPTS => {
                    return Err(e.into())
                }
                Err(StoreError::Conflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Build the `Forbidden` error and record the rejected attempt
    fn forbidden(
        &self,
        actor: &Actor,
        audit_action: AuditAction,
        action: &str,
        entity_id: &str,
    ) -> LifecycleError {
        let err = LifecycleError::forbidden(actor.role, action);
        tracing::warn!(user_id = %actor.user_id, role = %actor.role, action = action, "SLA action rejected");
        self.audit.record(
            AuditEntry::new(
                actor,
                audit_action,
                ENTITY,
                entity_id,
                format!("Attempt to {}", action),
                self.clock.now(),
            )
            .failed(err.to_string()),
        );
        err
    }
}

fn check_expected(tracker: &SlaTracker, expected: Option<u64>) -> LifecycleResult<()> {
    match expected {
        Some(expected) if expected != tracker.version => Err(LifecycleError::Conflict {
            entity: ENTITY.to_string(),
            id: tracker.id.clone(),
            expected,
            actual: tracker.version,
        }),
        _ => Ok(()),
    }
}

fn audit_action(event: &SlaEvent) -> AuditAction {
    match event {
        SlaEvent::Reminder { .. } => AuditAction::SlaReminderSent,
        SlaEvent::Escalation => AuditAction::SlaEscalated,
        SlaEvent::Dormant => AuditAction::SlaDormant,
    }
}

fn new_tracker_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("SLA-{}", id[..12].to_uppercase())
}
