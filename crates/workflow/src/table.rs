//! The case transition table
//!
//! A finite directed graph over [`CaseStatus`]; each edge carries the set
//! of roles allowed to take it. Every permission check in the service
//! reads this one table.

use gryork_core::{CaseStatus, Role};

use CaseStatus::*;

/// One permitted move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: CaseStatus,
    pub to: CaseStatus,
    pub roles: &'static [Role],
}

const SALES_DESK: &[Role] = &[Role::Sales, Role::Admin, Role::Founder];
const OPS_DESK: &[Role] = &[Role::Ops, Role::Admin, Role::Founder];
const DOC_SUBMITTERS: &[Role] = &[
    Role::Subcontractor,
    Role::Sales,
    Role::Ops,
    Role::Admin,
    Role::Founder,
];
const DOC_RESUBMITTERS: &[Role] = &[Role::Subcontractor, Role::Sales, Role::Ops];
const EPC_REVIEWERS: &[Role] = &[Role::Epc, Role::Ops, Role::Admin, Role::Founder];
const RMT_ONLY: &[Role] = &[Role::Rmt];
const RMT_OR_OPS: &[Role] = &[Role::Rmt, Role::Ops];
const RMT_RELEASE: &[Role] = &[Role::Rmt, Role::Ops, Role::Admin, Role::Founder];
const NBFC_ONLY: &[Role] = &[Role::Nbfc];
const NBFC_OR_OPS: &[Role] = &[Role::Nbfc, Role::Ops, Role::Admin, Role::Founder];

const fn edge(from: CaseStatus, to: CaseStatus, roles: &'static [Role]) -> Edge {
    Edge { from, to, roles }
}

/// Forward edges. Cancellation is handled separately: any non-terminal
/// status may move to `CANCELLED` by [`CANCEL_ROLES`].
pub const EDGES: &[Edge] = &[
    edge(LeadCreated, CredentialsCreated, SALES_DESK),
    edge(CredentialsCreated, DocsSubmitted, DOC_SUBMITTERS),
    edge(DocsSubmitted, ActionRequired, OPS_DESK),
    edge(ActionRequired, DocsSubmitted, DOC_RESUBMITTERS),
    edge(DocsSubmitted, KycCompleted, OPS_DESK),
    edge(KycCompleted, ReadyForCompanyReview, OPS_DESK),
    edge(ReadyForCompanyReview, EpcVerified, EPC_REVIEWERS),
    edge(ReadyForCompanyReview, EpcRejected, EPC_REVIEWERS),
    edge(EpcVerified, RmtQueue, OPS_DESK),
    edge(RmtQueue, RmtDocumentReview, RMT_ONLY),
    edge(RmtDocumentReview, RmtPendingDocs, RMT_ONLY),
    edge(RmtPendingDocs, RmtDocumentReview, RMT_OR_OPS),
    edge(RmtDocumentReview, RmtRiskAnalysis, RMT_ONLY),
    edge(RmtRiskAnalysis, RmtApproved, RMT_ONLY),
    edge(RmtRiskAnalysis, RmtRejected, RMT_ONLY),
    edge(RmtApproved, CwcafReady, RMT_RELEASE),
    edge(CwcafReady, BidPlaced, NBFC_ONLY),
    edge(BidPlaced, NegotiationInProgress, NBFC_OR_OPS),
    edge(BidPlaced, CommercialLocked, OPS_DESK),
    edge(NegotiationInProgress, CommercialLocked, OPS_DESK),
    edge(CommercialLocked, SharedWithNbfc, OPS_DESK),
    edge(SharedWithNbfc, Disbursed, NBFC_OR_OPS),
];

pub const CANCEL_ROLES: &[Role] = OPS_DESK;

/// Statuses only reachable through a dedicated operation, never through a
/// plain status change: bidding opens with the first bid and terms are
/// locked by accepting one
pub const RESERVED_TARGETS: &[CaseStatus] = &[BidPlaced, CommercialLocked];

/// The operation that reaches a reserved status
pub fn reserved_via(target: CaseStatus) -> Option<&'static str> {
    match target {
        BidPlaced => Some("placing the first bid"),
        CommercialLocked => Some("accepting a bid"),
        _ => None,
    }
}

/// Roles permitted on `from -> to`, or `None` if there is no such edge
pub fn permitted_roles(from: CaseStatus, to: CaseStatus) -> Option<&'static [Role]> {
    if to == Cancelled {
        return (!from.is_terminal()).then_some(CANCEL_ROLES);
    }
    EDGES
        .iter()
        .find(|e| e.from == from && e.to == to)
        .map(|e| e.roles)
}

pub fn is_edge(from: CaseStatus, to: CaseStatus) -> bool {
    permitted_roles(from, to).is_some()
}

/// Targets `role` may move a case to from `from`
pub fn targets_for(from: CaseStatus, role: Role) -> Vec<CaseStatus> {
    let mut targets: Vec<CaseStatus> = EDGES
        .iter()
        .filter(|e| e.from == from && e.roles.contains(&role))
        .map(|e| e.to)
        .collect();
    if !from.is_terminal() && CANCEL_ROLES.contains(&role) {
        targets.push(Cancelled);
    }
    targets
}
