//! Repository traits

use chrono::{DateTime, Utc};
use gryork_core::{Actor, Bid, Case, CaseStatus, NewCase, SlaStatus, SlaTracker};

use crate::error::StoreResult;

/// Case listing filter; the default matches every case
#[derive(Debug, Clone, Default)]
pub struct CaseFilter {
    pub status: Option<CaseStatus>,
    pub sub_contractor_id: Option<String>,
    pub epc_id: Option<String>,
    pub exclude_terminal: bool,
}

impl CaseFilter {
    pub fn matches(&self, case: &Case) -> bool {
        if let Some(status) = self.status {
            if case.status != status {
                return false;
            }
        }
        if let Some(ref sc) = self.sub_contractor_id {
            if &case.sub_contractor_id != sc {
                return false;
            }
        }
        if let Some(ref epc) = self.epc_id {
            if &case.epc_id != epc {
                return false;
            }
        }
        !(self.exclude_terminal && case.is_terminal())
    }
}

/// Tracker listing filter; empty `statuses` matches any status
#[derive(Debug, Clone, Default)]
pub struct TrackerFilter {
    pub statuses: Vec<SlaStatus>,
    pub case_id: Option<String>,
}

impl TrackerFilter {
    pub fn with_statuses(statuses: &[SlaStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            case_id: None,
        }
    }

    pub fn for_case(case_id: impl Into<String>) -> Self {
        Self {
            statuses: Vec::new(),
            case_id: Some(case_id.into()),
        }
    }

    pub fn matches(&self, tracker: &SlaTracker) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&tracker.status) {
            return false;
        }
        match self.case_id {
            Some(ref id) => &tracker.case_id == id,
            None => true,
        }
    }
}

/// Case persistence
///
/// `update_case` writes only if the stored version equals `case.version`,
/// and returns the record as stored (version incremented).
pub trait CaseRepository: Send + Sync {
    /// Issue an id and the next case number, store at version 1
    fn insert_case(
        &self,
        new_case: NewCase,
        created_by: &Actor,
        at: DateTime<Utc>,
    ) -> StoreResult<Case>;

    fn get_case(&self, id: &str) -> StoreResult<Case>;

    /// Matching cases in case-number order
    fn list_cases(&self, filter: &CaseFilter) -> StoreResult<Vec<Case>>;

    fn update_case(&self, case: &Case) -> StoreResult<Case>;
}

/// SLA tracker persistence, same version discipline as cases
pub trait TrackerRepository: Send + Sync {
    fn insert_tracker(&self, tracker: &SlaTracker) -> StoreResult<SlaTracker>;

    fn get_tracker(&self, id: &str) -> StoreResult<SlaTracker>;

    /// Matching trackers, oldest first
    fn list_trackers(&self, filter: &TrackerFilter) -> StoreResult<Vec<SlaTracker>>;

    fn update_tracker(&self, tracker: &SlaTracker) -> StoreResult<SlaTracker>;
}

/// Bid persistence, same version discipline as cases
pub trait BidRepository: Send + Sync {
    fn insert_bid(&self, bid: &Bid) -> StoreResult<Bid>;

    fn get_bid(&self, id: &str) -> StoreResult<Bid>;

    /// Bids for a case, oldest first
    fn list_bids_for_case(&self, case_id: &str) -> StoreResult<Vec<Bid>>;

    fn update_bid(&self, bid: &Bid) -> StoreResult<Bid>;
}

/// Everything the lifecycle services need from persistence
pub trait Store: CaseRepository + TrackerRepository + BidRepository {}

impl<T: CaseRepository + TrackerRepository + BidRepository> Store for T {}
