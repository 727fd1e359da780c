//! Gryork Bid Ledger
//!
//! Collects NBFC offers on a case in a biddable status and locks the
//! commercial terms of exactly one of them.
//!
//! ```text
//!   PLACED ──withdraw (own NBFC)──► WITHDRAWN
//!     │
//!     ├──accept (ops/admin/founder)──► ACCEPTED   (case → COMMERCIAL_LOCKED)
//!     └──sibling accepted───────────► SUPERSEDED
//! ```
//!
//! Accepting writes the case first (status + locked terms, under the case
//! version guard); sibling bids are settled after that write commits.

mod ledger;

pub use ledger::{Acceptance, BidLedger};
