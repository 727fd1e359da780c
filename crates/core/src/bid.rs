//! NBFC bids

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};

use crate::case::LockedTerms;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
    IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BidStatus {
    Placed,
    Withdrawn,
    Accepted,
    Superseded,
}

impl BidStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Only placed bids can still change
    pub fn is_final(&self) -> bool {
        !matches!(self, BidStatus::Placed)
    }
}

/// One NBFC's offer against a case in the bidding stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: String,
    pub case_id: String,
    pub bid_amount: Decimal,
    pub funding_duration_days: u32,
    pub placed_by: String,
    pub status: BidStatus,
    pub locked_terms: Option<LockedTerms>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Bid {
    pub fn new(
        id: String,
        case_id: String,
        bid_amount: Decimal,
        funding_duration_days: u32,
        placed_by: String,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            case_id,
            bid_amount,
            funding_duration_days,
            placed_by,
            status: BidStatus::Placed,
            locked_terms: None,
            created_at: at,
            updated_at: at,
            version: 0,
        }
    }
}
