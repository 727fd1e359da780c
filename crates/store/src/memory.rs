//! In-memory store

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use gryork_core::{Actor, Bid, Case, NewCase, SlaTracker};

use crate::error::{StoreError, StoreResult};
use crate::repository::{
    BidRepository, CaseFilter, CaseRepository, TrackerFilter, TrackerRepository,
};
use crate::{case_number, FIRST_CASE_SEQUENCE};

#[derive(Debug, Default)]
struct CaseTable {
    next_seq: u64,
    rows: HashMap<String, (u64, Case)>,
}

/// Process-local store backed by `RwLock`ed hash maps
///
/// The write lock is held only for the compare-and-swap of one record.
#[derive(Debug, Default)]
pub struct MemoryStore {
    cases: RwLock<CaseTable>,
    trackers: RwLock<HashMap<String, SlaTracker>>,
    bids: RwLock<HashMap<String, Bid>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Compare-and-swap on a versioned record
fn check_version(
    entity: &'static str,
    id: &str,
    stored: u64,
    expected: u64,
) -> StoreResult<()> {
    if stored != expected {
        return Err(StoreError::Conflict {
            entity,
            id: id.to_string(),
            expected,
            actual: stored,
        });
    }
    Ok(())
}

impl CaseRepository for MemoryStore {
    fn insert_case(
        &self,
        new_case: NewCase,
        created_by: &Actor,
        at: DateTime<Utc>,
    ) -> StoreResult<Case> {
        let mut table = self.cases.write().map_err(|_| StoreError::Poisoned)?;
        let seq = table.next_seq.max(FIRST_CASE_SEQUENCE);
        table.next_seq = seq + 1;

        let mut case = Case::open(
            uuid::Uuid::new_v4().to_string(),
            case_number(seq),
            new_case,
            created_by,
            at,
        );
        case.version = 1;
        table.rows.insert(case.id.clone(), (seq, case.clone()));
        Ok(case)
    }

    fn get_case(&self, id: &str) -> StoreResult<Case> {
        let table = self.cases.read().map_err(|_| StoreError::Poisoned)?;
        table
            .rows
            .get(id)
            .map(|(_, case)| case.clone())
            .ok_or_else(|| StoreError::not_found("case", id))
    }

    fn list_cases(&self, filter: &CaseFilter) -> StoreResult<Vec<Case>> {
        let table = self.cases.read().map_err(|_| StoreError::Poisoned)?;
        let mut rows: Vec<&(u64, Case)> = table
            .rows
            .values()
            .filter(|(_, case)| filter.matches(case))
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        Ok(rows.into_iter().map(|(_, case)| case.clone()).collect())
    }

    fn update_case(&self, case: &Case) -> StoreResult<Case> {
        let mut table = self.cases.write().map_err(|_| StoreError::Poisoned)?;
        let (_, stored) = table
            .rows
            .get_mut(&case.id)
            .ok_or_else(|| StoreError::not_found("case", &case.id))?;
        check_version("case", &case.id, stored.version, case.version)?;

        let mut next = case.clone();
        next.version = case.version + 1;
        *stored = next.clone();
        Ok(next)
    }
}

impl TrackerRepository for MemoryStore {
    fn insert_tracker(&self, tracker: &SlaTracker) -> StoreResult<SlaTracker> {
        let mut trackers = self.trackers.write().map_err(|_| StoreError::Poisoned)?;
        let mut stored = tracker.clone();
        stored.version = 1;
        trackers.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    fn get_tracker(&self, id: &str) -> StoreResult<SlaTracker> {
        let trackers = self.trackers.read().map_err(|_| StoreError::Poisoned)?;
        trackers
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("sla tracker", id))
    }

    fn list_trackers(&self, filter: &TrackerFilter) -> StoreResult<Vec<SlaTracker>> {
        let trackers = self.trackers.read().map_err(|_| StoreError::Poisoned)?;
        let mut matching: Vec<SlaTracker> = trackers
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matching)
    }

    fn update_tracker(&self, tracker: &SlaTracker) -> StoreResult<SlaTracker> {
        let mut trackers = self.trackers.write().map_err(|_| StoreError::Poisoned)?;
        let stored = trackers
            .get_mut(&tracker.id)
            .ok_or_else(|| StoreError::not_found("sla tracker", &tracker.id))?;
        check_version("sla tracker", &tracker.id, stored.version, tracker.version)?;

        let mut next = tracker.clone();
        next.version = tracker.version + 1;
        *stored = next.clone();
        Ok(next)
    }
}

impl BidRepository for MemoryStore {
    fn insert_bid(&self, bid: &Bid) -> StoreResult<Bid> {
        let mut bids = self.bids.write().map_err(|_| StoreError::Poisoned)?;
        let mut stored = bid.clone();
        stored.version = 1;
        bids.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    fn get_bid(&self, id: &str) -> StoreResult<Bid> {
        let bids = self.bids.read().map_err(|_| StoreError::Poisoned)?;
        bids.get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("bid", id))
    }

    fn list_bids_for_case(&self, case_id: &str) -> StoreResult<Vec<Bid>> {
        let bids = self.bids.read().map_err(|_| StoreError::Poisoned)?;
        let mut matching: Vec<Bid> = bids
            .values()
            .filter(|b| b.case_id == case_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matching)
    }

    fn update_bid(&self, bid: &Bid) -> StoreResult<Bid> {
        let mut bids = self.bids.write().map_err(|_| StoreError::Poisoned)?;
        let stored = bids
            .get_mut(&bid.id)
            .ok_or_else(|| StoreError::not_found("bid", &bid.id))?;
        check_version("bid", &bid.id, stored.version, bid.version)?;

        let mut next = bid.clone();
        next.version = bid.version + 1;
        *stored = next.clone();
        Ok(next)
    }
}
