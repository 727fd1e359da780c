//! Gryork Transition Authority
//!
//! Validates and applies case status changes against one declarative
//! transition table ([`table::EDGES`]).
//!
//! Order of checks for `transition`:
//! 1. the `(current, target)` edge must exist, else `InvalidTransition`
//! 2. the actor's role must be on the edge, else `Forbidden` (audited as a
//!    failed attempt)
//! 3. the write is conditioned on the version that was read, else `Conflict`
//!
//! A committed transition appends one history entry, writes one audit row
//! and then adjusts SLA trackers for the stage left and the stage entered.

pub mod authority;
pub mod table;

pub use authority::{TransitionAuthority, TransitionRequest};
pub use table::{permitted_roles, targets_for, Edge, EDGES};
