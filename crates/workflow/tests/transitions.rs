//! Transition Authority against the in-memory store

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Barrier, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use gryork_audit::{
    AuditAction, AuditCategory, AuditEntry, AuditError, AuditQuery, AuditRecorder, AuditResult,
    AuditSink, MemoryAuditSink,
};
use gryork_core::{
    Actor, Bid, Case, CaseStatus, ErrorKind, LifecycleError, LockedTerms, ManualClock, NewCase,
    Role, SlaStatus, SlaTracker,
};
use gryork_sla::{LogNotifier, SlaConfig, SlaEngine};
use gryork_store::{
    BidRepository, CaseFilter, CaseRepository, MemoryStore, StoreResult, TrackerFilter,
    TrackerRepository,
};
use gryork_workflow::{permitted_roles, table, TransitionAuthority, TransitionRequest, EDGES};
use strum::IntoEnumIterator;

struct Harness {
    authority: TransitionAuthority,
    sla: Arc<SlaEngine>,
    audit: Arc<AuditRecorder>,
}

fn harness_with_sink(sink: Arc<dyn AuditSink>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let audit = Arc::new(AuditRecorder::new(sink));
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap(),
    ));
    let sla = Arc::new(
        SlaEngine::new(
            store.clone(),
            audit.clone(),
            clock.clone(),
            Arc::new(LogNotifier),
            SlaConfig::default(),
        )
        .unwrap(),
    );
    let authority = TransitionAuthority::new(store, sla.clone(), audit.clone(), clock);
    Harness {
        authority,
        sla,
        audit,
    }
}

fn harness() -> Harness {
    harness_with_sink(Arc::new(MemoryAuditSink::new()))
}

fn actor(role: Role) -> Actor {
    Actor::new(format!("{}-1", role.as_str()), role)
}

fn new_case() -> NewCase {
    NewCase {
        sub_contractor_id: "sc-42".to_string(),
        epc_id: "epc-7".to_string(),
        bill_id: Some("bill-9".to_string()),
        cwcrf_id: Some("cwcrf-3".to_string()),
    }
}

/// Shortest forward path from LEAD_CREATED to `target`
fn path_to(target: CaseStatus) -> Vec<CaseStatus> {
    if target == CaseStatus::Cancelled {
        return vec![CaseStatus::Cancelled];
    }
    let mut parent: HashMap<CaseStatus, CaseStatus> = HashMap::new();
    let mut queue = VecDeque::from([CaseStatus::LeadCreated]);
    while let Some(s) = queue.pop_front() {
        if s == target {
            break;
        }
        for e in EDGES.iter().filter(|e| e.from == s) {
            if e.to != CaseStatus::LeadCreated && !parent.contains_key(&e.to) {
                parent.insert(e.to, s);
                queue.push_back(e.to);
            }
        }
    }
    let mut path = Vec::new();
    let mut cur = target;
    while cur != CaseStatus::LeadCreated {
        path.push(cur);
        cur = parent[&cur];
    }
    path.reverse();
    path
}

impl Harness {
    fn open(&self) -> Case {
        self.authority
            .create_case(new_case(), &actor(Role::Sales))
            .unwrap()
    }

    /// Open a case and walk it to `status` with permitted actors
    fn case_at(&self, status: CaseStatus) -> Case {
        let mut case = self.open();
        for next in path_to(status) {
            case = if next == CaseStatus::BidPlaced {
                self.authority
                    .open_bidding(case, &actor(Role::Nbfc), None)
                    .unwrap()
            } else if next == CaseStatus::CommercialLocked {
                let terms = LockedTerms {
                    final_amount: 250_000.into(),
                    final_duration: 45,
                    bid_id: "BID-TEST".to_string(),
                    locked_by: "ops-1".to_string(),
                    locked_at: Utc::now(),
                };
                self.authority
                    .lock_terms(case, terms, &actor(Role::Ops), None)
                    .unwrap()
            } else {
                let role = permitted_roles(case.status, next).unwrap()[0];
                self.authority
                    .transition(&case.id, next, &actor(role), None)
                    .unwrap()
            };
        }
        assert_eq!(case.status, status);
        case
    }

    fn audit_rows(&self, query: AuditQuery) -> Vec<AuditEntry> {
        self.audit
            .query(&AuditQuery {
                limit: Some(500),
                ..query
            })
            .unwrap()
            .entries
    }
}

#[test]
fn test_case_numbers_are_issued_in_order() {
    let h = harness();
    assert_eq!(h.open().case_number, "C-1001");
    assert_eq!(h.open().case_number, "C-1002");

    let nbfc = actor(Role::Nbfc);
    let err = h.authority.create_case(new_case(), &nbfc).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let mut blank = new_case();
    blank.epc_id = "  ".to_string();
    let err = h
        .authority
        .create_case(blank, &actor(Role::Sales))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_ops_completes_kyc_on_c1001() {
    let h = harness();
    let case = h.case_at(CaseStatus::DocsSubmitted);
    assert_eq!(case.case_number, "C-1001");
    let before = h.audit_rows(AuditQuery::default()).len();

    let updated = h
        .authority
        .transition(
            &case.id,
            CaseStatus::KycCompleted,
            &actor(Role::Ops),
            Some("PAN and GST verified".to_string()),
        )
        .unwrap();

    assert_eq!(updated.status, CaseStatus::KycCompleted);
    assert_eq!(updated.status_history.len(), case.status_history.len() + 1);
    let last = updated.status_history.last().unwrap();
    assert_eq!(last.status, CaseStatus::KycCompleted);
    assert_eq!(last.changed_by_user_id, "ops-1");
    assert_eq!(last.notes.as_deref(), Some("PAN and GST verified"));
    assert_eq!(updated.version, case.version + 1);

    let rows = h.audit_rows(AuditQuery::default());
    assert_eq!(rows.len(), before + 1);
    assert_eq!(rows[0].category, AuditCategory::Case);
    assert_eq!(rows[0].action, AuditAction::CaseStatusChanged);
    assert!(rows[0].success);
    assert_eq!(rows[0].entity_id, case.id);
}

#[test]
fn test_sales_cannot_jump_to_rmt_approved() {
    let h = harness();
    let case = h.case_at(CaseStatus::KycCompleted);

    let err = h
        .authority
        .transition(&case.id, CaseStatus::RmtApproved, &actor(Role::Sales), None)
        .unwrap_err();
    assert_eq!(
        err,
        LifecycleError::InvalidTransition {
            from: CaseStatus::KycCompleted,
            to: CaseStatus::RmtApproved,
        }
    );
    assert_eq!(h.authority.get_case(&case.id).unwrap(), case);
}

#[test]
fn test_every_edge_succeeds_for_every_permitted_role() {
    let h = harness();
    for edge in EDGES {
        if table::RESERVED_TARGETS.contains(&edge.to) {
            continue;
        }
        for role in edge.roles {
            let case = h.case_at(edge.from);
            let updated = h
                .authority
                .transition(&case.id, edge.to, &actor(*role), None)
                .unwrap_or_else(|e| panic!("{} -> {} as {}: {}", edge.from, edge.to, role, e));
            assert_eq!(updated.status, edge.to);
            assert_eq!(updated.status_history.len(), case.status_history.len() + 1);
            assert_eq!(updated.status_history.last().unwrap().status, edge.to);
        }
    }
}

#[test]
fn test_cancel_from_any_open_status() {
    let h = harness();
    for status in CaseStatus::iter().filter(|s| !s.is_terminal()) {
        let case = h.case_at(status);
        let cancelled = h
            .authority
            .transition(&case.id, CaseStatus::Cancelled, &actor(Role::Founder), None)
            .unwrap();
        assert_eq!(cancelled.status, CaseStatus::Cancelled);

        let err = h
            .authority
            .transition(&case.id, CaseStatus::Cancelled, &actor(Role::Founder), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }
}

#[test]
fn test_non_edges_fail_and_leave_case_unchanged() {
    let h = harness();
    for from in CaseStatus::iter() {
        let case = h.case_at(from);
        for to in CaseStatus::iter().filter(|to| !table::is_edge(from, *to)) {
            let err = h
                .authority
                .transition(&case.id, to, &actor(Role::Founder), None)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidTransition, "{} -> {}", from, to);
        }
        assert_eq!(h.authority.get_case(&case.id).unwrap(), case);
    }
}

#[test]
fn test_unlisted_roles_are_forbidden_and_audited() {
    let h = harness();
    for edge in EDGES {
        let outsiders: Vec<Role> = Role::iter().filter(|r| !edge.roles.contains(r)).collect();
        let case = h.case_at(edge.from);
        for role in outsiders {
            let err = h
                .authority
                .transition(&case.id, edge.to, &actor(role), None)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Forbidden, "{} -> {} as {}", edge.from, edge.to, role);
        }
        assert_eq!(h.authority.get_case(&case.id).unwrap(), case);
    }

    let failed = h.audit_rows(AuditQuery {
        success: Some(false),
        ..Default::default()
    });
    assert!(!failed.is_empty());
    assert!(failed
        .iter()
        .all(|e| e.action == AuditAction::CaseStatusChanged && e.error_message.is_some()));
}

#[test]
fn test_concurrent_transitions_one_winner() {
    let h = harness();
    let case = h.case_at(CaseStatus::DocsSubmitted);
    let barrier = Barrier::new(2);

    let results: Vec<Result<Case, LifecycleError>> = std::thread::scope(|s| {
        let handles: Vec<_> = [CaseStatus::KycCompleted, CaseStatus::ActionRequired]
            .into_iter()
            .map(|target| {
                let (h, barrier, case) = (&h, &barrier, &case);
                s.spawn(move || {
                    barrier.wait();
                    h.authority.transition_with(
                        &case.id,
                        TransitionRequest::to(target).at_version(case.version),
                        &actor(Role::Ops),
                    )
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(loser.kind(), ErrorKind::Conflict);

    let stored = h.authority.get_case(&case.id).unwrap();
    assert_eq!(stored.status_history.len(), case.status_history.len() + 1);
    assert_eq!(stored.version, case.version + 1);
}

#[test]
fn test_stale_version_is_a_conflict() {
    let h = harness();
    let case = h.case_at(CaseStatus::DocsSubmitted);
    h.authority
        .transition(&case.id, CaseStatus::ActionRequired, &actor(Role::Ops), None)
        .unwrap();

    let err = h
        .authority
        .transition_with(
            &case.id,
            TransitionRequest::to(CaseStatus::DocsSubmitted).at_version(case.version),
            &actor(Role::Subcontractor),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

struct UnavailableSink;

impl AuditSink for UnavailableSink {
    fn append(&self, _entry: &AuditEntry) -> AuditResult<()> {
        Err(AuditError::Unavailable("audit database down".to_string()))
    }

    fn entries(&self) -> AuditResult<Vec<AuditEntry>> {
        Err(AuditError::Unavailable("audit database down".to_string()))
    }
}

#[test]
fn test_transition_survives_audit_outage() {
    let h = harness_with_sink(Arc::new(UnavailableSink));
    let case = h.case_at(CaseStatus::DocsSubmitted);

    let updated = h
        .authority
        .transition(&case.id, CaseStatus::KycCompleted, &actor(Role::Ops), None)
        .unwrap();

    assert_eq!(updated.status, CaseStatus::KycCompleted);
    assert_eq!(
        h.authority.get_case(&case.id).unwrap().status,
        CaseStatus::KycCompleted
    );
    assert!(h.audit.failed_writes() > 0);
}

#[test]
fn test_stage_trackers_follow_the_case() {
    let h = harness();
    let case = h.case_at(CaseStatus::RmtQueue);

    let trackers = h.sla.trackers_for_case(&case.id).unwrap();
    assert_eq!(trackers.len(), 2);
    let epc = trackers
        .iter()
        .find(|t| t.stage == Some(CaseStatus::ReadyForCompanyReview))
        .unwrap();
    let rmt = trackers
        .iter()
        .find(|t| t.stage == Some(CaseStatus::RmtQueue))
        .unwrap();
    assert_eq!(epc.status, SlaStatus::Completed);
    assert_eq!(rmt.status, SlaStatus::Active);
    assert_eq!(rmt.sla_class, "RMT_REVIEW");

    h.authority
        .transition(&case.id, CaseStatus::RmtDocumentReview, &actor(Role::Rmt), None)
        .unwrap();
    assert_eq!(
        h.sla.get_tracker(&rmt.id).unwrap().status,
        SlaStatus::Completed
    );

    let cwcaf = h.case_at(CaseStatus::CwcafReady);
    h.authority
        .transition(&cwcaf.id, CaseStatus::Cancelled, &actor(Role::Ops), None)
        .unwrap();
    let open: Vec<_> = h
        .sla
        .trackers_for_case(&cwcaf.id)
        .unwrap()
        .into_iter()
        .filter(|t| !t.status.is_terminal())
        .collect();
    assert!(open.is_empty());
    assert!(h
        .sla
        .trackers_for_case(&cwcaf.id)
        .unwrap()
        .iter()
        .any(|t| t.status == SlaStatus::Cancelled));
}

#[test]
fn test_commercial_lock_only_through_terms() {
    let h = harness();
    let case = h.case_at(CaseStatus::BidPlaced);

    let err = h
        .authority
        .transition(&case.id, CaseStatus::CommercialLocked, &actor(Role::Ops), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStage);

    let terms = LockedTerms {
        final_amount: 500_000.into(),
        final_duration: 30,
        bid_id: "BID-1".to_string(),
        locked_by: "ops-1".to_string(),
        locked_at: Utc::now(),
    };
    let locked = h
        .authority
        .lock_terms(case.clone(), terms.clone(), &actor(Role::Ops), None)
        .unwrap();
    assert_eq!(locked.status, CaseStatus::CommercialLocked);
    assert_eq!(locked.locked_terms.as_ref(), Some(&terms));

    // The stale copy loses the version race
    let err = h
        .authority
        .lock_terms(case, terms.clone(), &actor(Role::Ops), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = h
        .authority
        .lock_terms(locked, terms, &actor(Role::Ops), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyLocked);
}

#[test]
fn test_bidding_opens_only_through_first_bid() {
    let h = harness();
    let case = h.case_at(CaseStatus::CwcafReady);

    let err = h
        .authority
        .transition(&case.id, CaseStatus::BidPlaced, &actor(Role::Nbfc), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStage);
    assert_eq!(h.authority.get_case(&case.id).unwrap(), case);
    assert!(h
        .sla
        .trackers_for_case(&case.id)
        .unwrap()
        .iter()
        .all(|t| t.stage != Some(CaseStatus::BidPlaced)));

    let available = h
        .authority
        .available_transitions(&case.id, &actor(Role::Nbfc))
        .unwrap();
    assert!(!available.contains(&CaseStatus::BidPlaced));

    let err = h
        .authority
        .open_bidding(case.clone(), &actor(Role::Ops), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let opened = h
        .authority
        .open_bidding(case.clone(), &actor(Role::Nbfc), Some("First bid received".to_string()))
        .unwrap();
    assert_eq!(opened.status, CaseStatus::BidPlaced);

    // The stale copy loses the version race
    let err = h
        .authority
        .open_bidding(case, &actor(Role::Nbfc), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = h
        .authority
        .open_bidding(opened, &actor(Role::Nbfc), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStage);
}

#[test]
fn test_risk_assessment_attached_on_rmt_decision() {
    let h = harness();
    let case = h.case_at(CaseStatus::RmtRiskAnalysis);

    let request = TransitionRequest {
        risk_assessment_id: Some("RA-77".to_string()),
        ..TransitionRequest::to(CaseStatus::RmtApproved)
    };
    let approved = h
        .authority
        .transition_with(&case.id, request, &actor(Role::Rmt))
        .unwrap();
    assert_eq!(approved.risk_assessment_id.as_deref(), Some("RA-77"));

    let other = h.case_at(CaseStatus::DocsSubmitted);
    let request = TransitionRequest {
        risk_assessment_id: Some("RA-78".to_string()),
        ..TransitionRequest::to(CaseStatus::KycCompleted)
    };
    let err = h
        .authority
        .transition_with(&other.id, request, &actor(Role::Ops))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_available_transitions() {
    let h = harness();
    let case = h.case_at(CaseStatus::BidPlaced);
    let ops = h
        .authority
        .available_transitions(&case.id, &actor(Role::Ops))
        .unwrap();
    assert_eq!(
        ops,
        vec![CaseStatus::NegotiationInProgress, CaseStatus::Cancelled]
    );
    let nbfc = h
        .authority
        .available_transitions(&case.id, &actor(Role::Nbfc))
        .unwrap();
    assert_eq!(nbfc, vec![CaseStatus::NegotiationInProgress]);
}

/// Memory store that lets another writer commit right after the next case write
struct InterleavingStore {
    inner: MemoryStore,
    after_case_write: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl InterleavingStore {
    fn after_next_case_write(&self, writer: impl FnOnce() + Send + 'static) {
        *self.after_case_write.lock().unwrap() = Some(Box::new(writer));
    }
}

impl CaseRepository for InterleavingStore {
    fn insert_case(&self, c: NewCase, by: &Actor, at: DateTime<Utc>) -> StoreResult<Case> {
        self.inner.insert_case(c, by, at)
    }
    fn get_case(&self, id: &str) -> StoreResult<Case> {
        self.inner.get_case(id)
    }
    fn list_cases(&self, filter: &CaseFilter) -> StoreResult<Vec<Case>> {
        self.inner.list_cases(filter)
    }
    fn update_case(&self, case: &Case) -> StoreResult<Case> {
        let stored = self.inner.update_case(case)?;
        let writer = self.after_case_write.lock().unwrap().take();
        if let Some(writer) = writer {
            writer();
        }
        Ok(stored)
    }
}

impl TrackerRepository for InterleavingStore {
    fn insert_tracker(&self, t: &SlaTracker) -> StoreResult<SlaTracker> {
        self.inner.insert_tracker(t)
    }
    fn get_tracker(&self, id: &str) -> StoreResult<SlaTracker> {
        self.inner.get_tracker(id)
    }
    fn list_trackers(&self, filter: &TrackerFilter) -> StoreResult<Vec<SlaTracker>> {
        self.inner.list_trackers(filter)
    }
    fn update_tracker(&self, t: &SlaTracker) -> StoreResult<SlaTracker> {
        self.inner.update_tracker(t)
    }
}

impl BidRepository for InterleavingStore {
    fn insert_bid(&self, b: &Bid) -> StoreResult<Bid> {
        self.inner.insert_bid(b)
    }
    fn get_bid(&self, id: &str) -> StoreResult<Bid> {
        self.inner.get_bid(id)
    }
    fn list_bids_for_case(&self, case_id: &str) -> StoreResult<Vec<Bid>> {
        self.inner.list_bids_for_case(case_id)
    }
    fn update_bid(&self, b: &Bid) -> StoreResult<Bid> {
        self.inner.update_bid(b)
    }
}

#[test]
fn test_cancel_racing_a_transition_leaves_no_open_tracker() {
    let store = Arc::new(InterleavingStore {
        inner: MemoryStore::new(),
        after_case_write: Mutex::new(None),
    });
    let audit = Arc::new(AuditRecorder::new(Arc::new(MemoryAuditSink::new())));
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap(),
    ));
    let sla = Arc::new(
        SlaEngine::new(
            store.clone(),
            audit.clone(),
            clock.clone(),
            Arc::new(LogNotifier),
            SlaConfig::default(),
        )
        .unwrap(),
    );
    let authority = Arc::new(TransitionAuthority::new(store.clone(), sla.clone(), audit, clock));

    let mut case = authority.create_case(new_case(), &actor(Role::Sales)).unwrap();
    for next in path_to(CaseStatus::KycCompleted) {
        let role = permitted_roles(case.status, next).unwrap()[0];
        case = authority.transition(&case.id, next, &actor(role), None).unwrap();
    }

    let canceller = authority.clone();
    let case_id = case.id.clone();
    store.after_next_case_write(move || {
        canceller
            .transition(&case_id, CaseStatus::Cancelled, &actor(Role::Founder), None)
            .unwrap();
    });
    let moved = authority
        .transition(&case.id, CaseStatus::ReadyForCompanyReview, &actor(Role::Ops), None)
        .unwrap();
    assert_eq!(moved.status, CaseStatus::ReadyForCompanyReview);
    assert_eq!(
        authority.get_case(&case.id).unwrap().status,
        CaseStatus::Cancelled
    );

    let trackers = sla.trackers_for_case(&case.id).unwrap();
    let review = trackers
        .iter()
        .find(|t| t.stage == Some(CaseStatus::ReadyForCompanyReview))
        .unwrap();
    assert_eq!(review.status, SlaStatus::Cancelled);
    assert!(trackers.iter().all(|t| t.status.is_terminal()));
}
