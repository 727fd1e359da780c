//! The Case aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::actor::Actor;
use crate::error::{LifecycleError, LifecycleResult};
use crate::status::CaseStatus;

/// One entry of a case's status history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub status: CaseStatus,
    pub changed_at: DateTime<Utc>,
    pub changed_by_user_id: String,
    pub notes: Option<String>,
}

/// Final commercial terms agreed through an accepted bid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedTerms {
    pub final_amount: Decimal,
    pub final_duration: u32,
    pub bid_id: String,
    pub locked_by: String,
    pub locked_at: DateTime<Utc>,
}

/// Input for opening a new case
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCase {
    pub sub_contractor_id: String,
    pub epc_id: String,
    #[serde(default)]
    pub bill_id: Option<String>,
    #[serde(default, alias = "cwcRfId")]
    pub cwcrf_id: Option<String>,
}

/// A single bill-discounting financing request
///
/// Linked entities are held by id only. `status_history` is append-only
/// and `locked_terms` is written once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub id: String,
    pub case_number: String,
    pub status: CaseStatus,
    pub status_history: Vec<StatusChange>,
    pub sub_contractor_id: String,
    pub epc_id: String,
    pub bill_id: Option<String>,
    #[serde(alias = "cwcRfId")]
    pub cwcrf_id: Option<String>,
    pub risk_assessment_id: Option<String>,
    pub locked_terms: Option<LockedTerms>,
    /// Advisory flag set by the dormancy sweep, cleared by the next transition
    #[serde(default)]
    pub dormant: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Case {
    /// Build a fresh case in `LEAD_CREATED` with its first history entry
    pub fn open(
        id: String,
        case_number: String,
        new_case: NewCase,
        created_by: &Actor,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            case_number,
            status: CaseStatus::LeadCreated,
            status_history: vec![StatusChange {
                status: CaseStatus::LeadCreated,
                changed_at: at,
                changed_by_user_id: created_by.user_id.clone(),
                notes: None,
            }],
            sub_contractor_id: new_case.sub_contractor_id,
            epc_id: new_case.epc_id,
            bill_id: new_case.bill_id,
            cwcrf_id: new_case.cwcrf_id,
            risk_assessment_id: None,
            locked_terms: None,
            dormant: false,
            created_at: at,
            updated_at: at,
            version: 0,
        }
    }

    /// Record a status change. Edge legality is checked by the caller.
    pub fn record_status(
        &mut self,
        status: CaseStatus,
        actor: &Actor,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.status = status;
        self.status_history.push(StatusChange {
            status,
            changed_at: at,
            changed_by_user_id: actor.user_id.clone(),
            notes,
        });
        self.dormant = false;
        self.updated_at = at;
    }

    /// Set the commercial terms; fails if they were already locked
    pub fn lock_terms(&mut self, terms: LockedTerms) -> LifecycleResult<()> {
        if self.locked_terms.is_some() {
            return Err(LifecycleError::AlreadyLocked(self.id.clone()));
        }
        self.locked_terms = Some(terms);
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
