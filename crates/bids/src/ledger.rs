//! Bid ledger operations

use std::sync::Arc;

use gryork_audit::{AuditAction, AuditEntry, AuditRecorder};
use gryork_core::{
    Actor, Bid, BidStatus, Case, CaseStatus, Clock, LifecycleError, LifecycleResult, LockedTerms,
    Role,
};
use gryork_store::{Store, StoreError};
use gryork_workflow::TransitionAuthority;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ENTITY: &str = "bid";

/// Reload-and-retry attempts when a racing writer wins
const MAX_ATTEMPTS: usize = 3;

/// Result of a successful accept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acceptance {
    pub case: Case,
    pub bid: Bid,
    pub superseded: Vec<String>,
}

pub struct BidLedger {
    store: Arc<dyn Store>,
    authority: Arc<TransitionAuthority>,
    audit: Arc<AuditRecorder>,
    clock: Arc<dyn Clock>,
}

impl BidLedger {
    pub fn new(
        store: Arc<dyn Store>,
        authority: Arc<TransitionAuthority>,
        audit: Arc<AuditRecorder>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            authority,
            audit,
            clock,
        }
    }

    /// Record an NBFC offer; the first bid moves the case to `BID_PLACED`
    pub fn place_bid(
        &self,
        case_id: &str,
        bid_amount: Decimal,
        funding_duration_days: u32,
        actor: &Actor,
    ) -> LifecycleResult<Bid> {
        if actor.role != Role::Nbfc {
            return Err(self.reject(actor, AuditAction::BidPlaced, case_id, "place bids"));
        }
        if bid_amount <= Decimal::ZERO {
            return Err(LifecycleError::Validation(format!(
                "bid amount must be positive, got {}",
                bid_amount
            )));
        }
        if funding_duration_days == 0 {
            return Err(LifecycleError::Validation(
                "funding duration must be at least one day".to_string(),
            ));
        }

        let case = self.store.get_case(case_id)?;
        ensure_biddable(&case)?;
        if case.status == CaseStatus::CwcafReady {
            self.open_bidding(case, actor)?;
        }

        let now = self.clock.now();
        let bid = Bid::new(
            new_bid_id(),
            case_id.to_string(),
            bid_amount,
            funding_duration_days,
            actor.user_id.clone(),
            now,
        );
        let bid = self.store.insert_bid(&bid)?;

        // An accept or cancel may have committed between the check and the
        // insert; a bid must never stay PLACED on a closed case
        let current = self.store.get_case(case_id)?;
        let closed = match current.locked_terms {
            Some(_) => Some(LifecycleError::AlreadyLocked(current.case_number.clone())),
            None => ensure_biddable(&current).err(),
        };
        if let Some(err) = closed {
            self.settle_bid(&bid.id, |b| {
                if b.status != BidStatus::Placed {
                    return false;
                }
                b.status = BidStatus::Superseded;
                b.updated_at = now;
                true
            })?;
            tracing::warn!(
                bid_id = %bid.id,
                case_id = %case_id,
                status = %current.status,
                "Late bid superseded; case closed to bidding"
            );
            return Err(err);
        }

        tracing::info!(
            bid_id = %bid.id,
            case_id = %case_id,
            amount = %bid.bid_amount,
            days = bid.funding_duration_days,
            nbfc = %actor.user_id,
            "Bid placed"
        );
        self.audit.record(AuditEntry::new(
            actor,
            AuditAction::BidPlaced,
            ENTITY,
            &bid.id,
            format!(
                "Bid of {} for {} days on case {}",
                bid.bid_amount, bid.funding_duration_days, case_id
            ),
            now,
        ));
        Ok(bid)
    }

    /// Move a `CWCAF_READY` case to `BID_PLACED`, tolerating a racing
    /// first bid that already did it
    fn open_bidding(&self, mut case: Case, actor: &Actor) -> LifecycleResult<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let notes = Some("First bid received".to_string());
            match self.authority.open_bidding(case.clone(), actor, notes) {
                Ok(_) => return Ok(()),
                Err(e) if e.is_conflict() && attempt < MAX_ATTEMPTS => {
                    case = self.store.get_case(&case.id)?;
                    if case.status != CaseStatus::CwcafReady {
                        return ensure_biddable(&case);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Withdraw a still-placed bid; only the NBFC that placed it may
    pub fn withdraw_bid(&self, bid_id: &str, actor: &Actor) -> LifecycleResult<Bid> {
        let mut bid = self.store.get_bid(bid_id)?;
        if actor.role != Role::Nbfc || bid.placed_by != actor.user_id {
            return Err(self.reject(actor, AuditAction::BidWithdrawn, bid_id, "withdraw this bid"));
        }
        if bid.status != BidStatus::Placed {
            return Err(LifecycleError::InvalidStage(format!(
                "bid {} is {}",
                bid.id, bid.status
            )));
        }

        let now = self.clock.now();
        bid.status = BidStatus::Withdrawn;
        bid.updated_at = now;
        let bid = self.store.update_bid(&bid)?;

        tracing::info!(bid_id = %bid.id, case_id = %bid.case_id, "Bid withdrawn");
        self.audit.record(AuditEntry::new(
            actor,
            AuditAction::BidWithdrawn,
            ENTITY,
            &bid.id,
            format!("Bid withdrawn from case {}", bid.case_id),
            now,
        ));
        Ok(bid)
    }

    /// Accept one bid: lock the case terms, then settle every bid on the case
    pub fn accept_bid(&self, bid_id: &str, actor: &Actor) -> LifecycleResult<Acceptance> {
        if !actor.role.is_supervisor() {
            return Err(self.reject(actor, AuditAction::BidAccepted, bid_id, "accept bids"));
        }

        let bid = self.store.get_bid(bid_id)?;
        let case = self.store.get_case(&bid.case_id)?;
        if case.locked_terms.is_some() {
            return Err(LifecycleError::AlreadyLocked(case.case_number));
        }
        if bid.status != BidStatus::Placed {
            return Err(LifecycleError::InvalidStage(format!(
                "bid {} is {}",
                bid.id, bid.status
            )));
        }

        let now = self.clock.now();
        let terms = LockedTerms {
            final_amount: bid.bid_amount,
            final_duration: bid.funding_duration_days,
            bid_id: bid.id.clone(),
            locked_by: actor.user_id.clone(),
            locked_at: now,
        };

        let notes = format!("Accepted bid {}", bid.id);
        let case = match self
            .authority
            .lock_terms(case, terms.clone(), actor, Some(notes))
        {
            Ok(case) => case,
            Err(e) if e.is_conflict() => {
                // Lost the race; report a lock if that is what beat us
                let current = self.store.get_case(&bid.case_id)?;
                if current.locked_terms.is_some() {
                    return Err(LifecycleError::AlreadyLocked(current.case_number));
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        // The case now names the winner; bring the bids in line
        let accepted = self
            .settle_bid(&bid.id, |b| {
                if b.status != BidStatus::Placed {
                    tracing::warn!(bid_id = %b.id, status = %b.status, "Accepted bid changed after lock");
                }
                b.status = BidStatus::Accepted;
                b.locked_terms = Some(terms.clone());
                b.updated_at = now;
                true
            })?
            .unwrap_or(bid);

        let mut superseded = Vec::new();
        for sibling in self.store.list_bids_for_case(&case.id)? {
            if sibling.id == accepted.id || sibling.status != BidStatus::Placed {
                continue;
            }
            let settled = self.settle_bid(&sibling.id, |b| {
                if b.status != BidStatus::Placed {
                    return false;
                }
                b.status = BidStatus::Superseded;
                b.updated_at = now;
                true
            });
            match settled {
                Ok(Some(b)) => superseded.push(b.id),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(bid_id = %sibling.id, error = %e, "Failed to supersede bid")
                }
            }
        }

        tracing::info!(
            bid_id = %accepted.id,
            case_id = %case.id,
            case_number = %case.case_number,
            amount = %terms.final_amount,
            days = terms.final_duration,
            superseded = superseded.len(),
            "Bid accepted, terms locked"
        );
        self.audit.record(AuditEntry::new(
            actor,
            AuditAction::BidAccepted,
            ENTITY,
            &accepted.id,
            format!(
                "Accepted on {}: {} for {} days ({} superseded)",
                case.case_number,
                terms.final_amount,
                terms.final_duration,
                superseded.len()
            ),
            now,
        ));

        Ok(Acceptance {
            case,
            bid: accepted,
            superseded,
        })
    }

    pub fn get_bid(&self, bid_id: &str) -> LifecycleResult<Bid> {
        Ok(self.store.get_bid(bid_id)?)
    }

    /// Bids on a case, oldest first
    pub fn bids_for_case(&self, case_id: &str) -> LifecycleResult<Vec<Bid>> {
        self.store.get_case(case_id)?;
        Ok(self.store.list_bids_for_case(case_id)?)
    }

    fn settle_bid<F>(&self, bid_id: &str, apply: F) -> LifecycleResult<Option<Bid>>
    where
        F: Fn(&mut Bid) -> bool,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut bid = self.store.get_bid(bid_id)?;
            if !apply(&mut bid) {
                return Ok(None);
            }
            match self.store.update_bid(&bid) {
                Ok(stored) => return Ok(Some(stored)),
                Err(e @ StoreError::Conflict { .. }) if attempt >= MAX_ATTEMPTS => {
                    return Err(e.into())
                }
                Err(StoreError::Conflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn reject(
        &self,
        actor: &Actor,
        action: AuditAction,
        entity_id: &str,
        what: &str,
    ) -> LifecycleError {
        let err = LifecycleError::forbidden(actor.role, what);
        tracing::warn!(user_id = %actor.user_id, role = %actor.role, entity_id = %entity_id, "Bid action forbidden");
        self.audit.record(
            AuditEntry::new(
                actor,
                action,
                ENTITY,
                entity_id,
                format!("Attempt to {}", what),
                self.clock.now(),
            )
            .failed(err.to_string()),
        );
        err
    }
}

fn ensure_biddable(case: &Case) -> LifecycleResult<()> {
    if case.status.is_biddable() {
        Ok(())
    } else {
        Err(LifecycleError::InvalidStage(format!(
            "case {} is {}; bids are taken in CWCAF_READY, BID_PLACED or NEGOTIATION_IN_PROGRESS",
            case.case_number, case.status
        )))
    }
}

fn new_bid_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("BID-{}", id[..12].to_uppercase())
}
