//! Transition Authority - the sole writer of `Case.status`

use std::sync::Arc;

use gryork_audit::{AuditAction, AuditEntry, AuditRecorder};
use gryork_core::{
    Actor, Case, CaseStatus, Clock, LifecycleError, LifecycleResult, LockedTerms, NewCase, Role,
};
use gryork_sla::SlaEngine;
use gryork_store::{CaseFilter, Store};
use serde::{Deserialize, Serialize};

use crate::table;

const ENTITY: &str = "case";

const CASE_OPENERS: &[Role] = &[Role::Sales, Role::Ops, Role::Admin, Role::Founder];

/// A requested status change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub status: CaseStatus,
    #[serde(default)]
    pub notes: Option<String>,
    /// Fail with `Conflict` unless the case is still at this version
    #[serde(default)]
    pub version: Option<u64>,
    /// Risk assessment reference, accepted on the RMT decision edges
    #[serde(default)]
    pub risk_assessment_id: Option<String>,
}

impl TransitionRequest {
    pub fn to(status: CaseStatus) -> Self {
        Self {
            status,
            notes: None,
            version: None,
            risk_assessment_id: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn at_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }
}

pub struct TransitionAuthority {
    store: Arc<dyn Store>,
    sla: Arc<SlaEngine>,
    audit: Arc<AuditRecorder>,
    clock: Arc<dyn Clock>,
}

impl TransitionAuthority {
    pub fn new(
        store: Arc<dyn Store>,
        sla: Arc<SlaEngine>,
        audit: Arc<AuditRecorder>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            sla,
            audit,
            clock,
        }
    }

    /// Open a new case in `LEAD_CREATED`
    pub fn create_case(&self, new_case: NewCase, actor: &Actor) -> LifecycleResult<Case> {
        if !CASE_OPENERS.contains(&actor.role) {
            let err = LifecycleError::forbidden(actor.role, "create cases");
            self.audit.record(
                AuditEntry::new(
                    actor,
                    AuditAction::CaseCreated,
                    ENTITY,
                    "-",
                    "Attempt to create a case",
                    self.clock.now(),
                )
                .failed(err.to_string()),
            );
            return Err(err);
        }
        if new_case.sub_contractor_id.trim().is_empty() || new_case.epc_id.trim().is_empty() {
            return Err(LifecycleError::Validation(
                "subContractorId and epcId are required".to_string(),
            ));
        }

        let now = self.clock.now();
        let case = self.store.insert_case(new_case, actor, now)?;

        tracing::info!(
            case_id = %case.id,
            case_number = %case.case_number,
            user_id = %actor.user_id,
            "Case created"
        );
        self.audit.record(AuditEntry::new(
            actor,
            AuditAction::CaseCreated,
            ENTITY,
            &case.id,
            format!("Case {} created", case.case_number),
            now,
        ));
        Ok(case)
    }

    pub fn get_case(&self, case_id: &str) -> LifecycleResult<Case> {
        Ok(self.store.get_case(case_id)?)
    }

    pub fn list_cases(&self, filter: &CaseFilter) -> LifecycleResult<Vec<Case>> {
        Ok(self.store.list_cases(filter)?)
    }

    /// Statuses `actor` may move the case to right now
    pub fn available_transitions(
        &self,
        case_id: &str,
        actor: &Actor,
    ) -> LifecycleResult<Vec<CaseStatus>> {
        let case = self.store.get_case(case_id)?;
        Ok(table::targets_for(case.status, actor.role)
            .into_iter()
            .filter(|s| !table::RESERVED_TARGETS.contains(s))
            .collect())
    }

    /// Move a case to `target` at whatever version it currently is
    pub fn transition(
        &self,
        case_id: &str,
        target: CaseStatus,
        actor: &Actor,
        notes: Option<String>,
    ) -> LifecycleResult<Case> {
        let request = TransitionRequest {
            notes,
            ..TransitionRequest::to(target)
        };
        self.transition_with(case_id, request, actor)
    }

    /// Validate the edge and role, then commit under the version guard
    pub fn transition_with(
        &self,
        case_id: &str,
        request: TransitionRequest,
        actor: &Actor,
    ) -> LifecycleResult<Case> {
        let case = self.store.get_case(case_id)?;
        if let Some(expected) = request.version {
            if expected != case.version {
                return Err(LifecycleError::Conflict {
                    entity: ENTITY.to_string(),
                    id: case.id,
                    expected,
                    actual: case.version,
                });
            }
        }

        let target = request.status;
        self.authorize(&case, target, actor)?;
        if let Some(via) = table::reserved_via(target) {
            return Err(LifecycleError::InvalidStage(format!(
                "{} is reached by {}",
                target, via
            )));
        }

        let risk_assessment_id = request.risk_assessment_id;
        if risk_assessment_id.is_some()
            && !matches!(target, CaseStatus::RmtApproved | CaseStatus::RmtRejected)
        {
            return Err(LifecycleError::Validation(
                "riskAssessmentId is only accepted with an RMT decision".to_string(),
            ));
        }

        self.commit(case, target, actor, request.notes, |case| {
            if risk_assessment_id.is_some() {
                case.risk_assessment_id = risk_assessment_id;
            }
            Ok(())
        })
    }

    /// Move a `CWCAF_READY` case to `BID_PLACED` on its first bid
    ///
    /// Conditioned on the version of `case`, like `lock_terms`.
    pub fn open_bidding(
        &self,
        case: Case,
        actor: &Actor,
        notes: Option<String>,
    ) -> LifecycleResult<Case> {
        if case.status != CaseStatus::CwcafReady {
            return Err(LifecycleError::InvalidStage(format!(
                "bidding cannot open while case {} is {}",
                case.case_number, case.status
            )));
        }
        self.authorize(&case, CaseStatus::BidPlaced, actor)?;

        self.commit(case, CaseStatus::BidPlaced, actor, notes, |_| Ok(()))
    }

    /// Lock the commercial terms and move the case to `COMMERCIAL_LOCKED`
    ///
    /// `case` is the version the caller read; the write is conditioned on
    /// it, so of two racing lockers exactly one commits.
    pub fn lock_terms(
        &self,
        case: Case,
        terms: LockedTerms,
        actor: &Actor,
        notes: Option<String>,
    ) -> LifecycleResult<Case> {
        if case.locked_terms.is_some() {
            return Err(LifecycleError::AlreadyLocked(case.case_number));
        }
        if !matches!(
            case.status,
            CaseStatus::BidPlaced | CaseStatus::NegotiationInProgress
        ) {
            return Err(LifecycleError::InvalidStage(format!(
                "terms cannot be locked while case {} is {}",
                case.case_number, case.status
            )));
        }
        self.authorize(&case, CaseStatus::CommercialLocked, actor)?;

        self.commit(case, CaseStatus::CommercialLocked, actor, notes, |case| {
            case.lock_terms(terms)
        })
    }

    /// Edge must exist, then the actor's role must be on it
    fn authorize(&self, case: &Case, target: CaseStatus, actor: &Actor) -> LifecycleResult<()> {
        let Some(roles) = table::permitted_roles(case.status, target) else {
            tracing::warn!(
                case_id = %case.id,
                from = %case.status,
                to = %target,
                user_id = %actor.user_id,
                "Invalid transition rejected"
            );
            return Err(LifecycleError::InvalidTransition {
                from: case.status,
                to: target,
            });
        };

        if !roles.contains(&actor.role) {
            let err = LifecycleError::forbidden(
                actor.role,
                format!("move a case from {} to {}", case.status, target),
            );
            tracing::warn!(
                case_id = %case.id,
                from = %case.status,
                to = %target,
                user_id = %actor.user_id,
                role = %actor.role,
                "Transition forbidden"
            );
            self.audit.record(
                AuditEntry::new(
                    actor,
                    AuditAction::CaseStatusChanged,
                    ENTITY,
                    &case.id,
                    format!("Attempted {} -> {} on {}", case.status, target, case.case_number),
                    self.clock.now(),
                )
                .failed(err.to_string()),
            );
            return Err(err);
        }
        Ok(())
    }

    fn commit<F>(
        &self,
        case: Case,
        target: CaseStatus,
        actor: &Actor,
        notes: Option<String>,
        mutate: F,
    ) -> LifecycleResult<Case>
    where
        F: FnOnce(&mut Case) -> LifecycleResult<()>,
    {
        let from = case.status;
        let now = self.clock.now();

        let mut next = case;
        mutate(&mut next)?;
        next.record_status(target, actor, notes, now);
        let stored = self.store.update_case(&next)?;

        tracing::info!(
            case_id = %stored.id,
            case_number = %stored.case_number,
            from = %from,
            to = %target,
            user_id = %actor.user_id,
            version = stored.version,
            "Case transitioned"
        );
        self.audit.record(AuditEntry::new(
            actor,
            AuditAction::CaseStatusChanged,
            ENTITY,
            &stored.id,
            format!("{}: {} -> {}", stored.case_number, from, target),
            now,
        ));

        self.apply_side_effects(&stored, from, actor);
        Ok(stored)
    }

    /// SLA bookkeeping after a committed transition
    ///
    /// The transition already stands; failures here are logged only.
    fn apply_side_effects(&self, case: &Case, from: CaseStatus, actor: &Actor) {
        if case.is_terminal() {
            if let Err(e) = self.sla.cancel_for_case(&case.id, actor) {
                tracing::warn!(case_id = %case.id, error = %e, "Failed to cancel SLA trackers");
            }
            return;
        }

        if self.sla.config().is_tracked(from) {
            if let Err(e) = self.sla.close_stage(&case.id, from, actor) {
                tracing::warn!(case_id = %case.id, stage = %from, error = %e, "Failed to close SLA tracker");
            }
        }
        if let Err(e) = self.sla.activate_stage(case, case.status, actor) {
            tracing::warn!(case_id = %case.id, stage = %case.status, error = %e, "Failed to start SLA tracker");
        }
    }
}
