//! Gryork Core - domain types for the case lifecycle
//!
//! Closed vocabularies (roles, case/SLA/bid statuses), the `Case`,
//! `SlaTracker` and `Bid` records, the injected [`Clock`] and the shared
//! error taxonomy. Every other crate builds on these.

pub mod actor;
pub mod bid;
pub mod case;
pub mod clock;
pub mod error;
pub mod sla;
pub mod status;

pub use actor::{Actor, Role};
pub use bid::{Bid, BidStatus};
pub use case::{Case, LockedTerms, NewCase, StatusChange};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ErrorKind, LifecycleError, LifecycleResult};
pub use sla::{Milestone, MilestoneKey, MilestoneStatus, SlaEntityType, SlaStatus, SlaTracker};
pub use status::CaseStatus;
