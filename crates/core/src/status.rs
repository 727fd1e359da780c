//! Case lifecycle status vocabulary

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// Status of a financing case
///
/// Stored and transmitted as the SCREAMING_SNAKE_CASE name. Which moves
/// between statuses are legal is decided by the transition table in
/// `gryork-workflow`, not here.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    LeadCreated,
    CredentialsCreated,
    DocsSubmitted,
    ActionRequired,
    KycCompleted,
    ReadyForCompanyReview,
    EpcVerified,
    EpcRejected,
    RmtQueue,
    RmtDocumentReview,
    RmtPendingDocs,
    RmtRiskAnalysis,
    RmtApproved,
    RmtRejected,
    CwcafReady,
    BidPlaced,
    NegotiationInProgress,
    CommercialLocked,
    SharedWithNbfc,
    Disbursed,
    Cancelled,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        self.is_failure() || *self == CaseStatus::Disbursed
    }

    /// Terminal failure states
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CaseStatus::EpcRejected | CaseStatus::RmtRejected | CaseStatus::Cancelled
        )
    }

    /// Statuses in which NBFCs may place bids
    pub fn is_biddable(&self) -> bool {
        matches!(
            self,
            CaseStatus::CwcafReady | CaseStatus::BidPlaced | CaseStatus::NegotiationInProgress
        )
    }
}
