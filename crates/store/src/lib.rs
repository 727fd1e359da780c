//! Gryork Case Store
//!
//! Versioned persistence for the three mutable records of the lifecycle:
//! cases, SLA trackers and bids. Every read carries a `version`; every
//! update is conditioned on that version being unchanged, so concurrent
//! writers never clobber each other. The loser gets
//! [`StoreError::Conflict`] and must reload.
//!
//! Two backends:
//! - [`MemoryStore`] - `RwLock`ed maps, for tests and single-process use
//! - [`SqliteStore`] - SQLite documents with indexed status/version columns

mod error;
mod memory;
mod repository;
mod sqlite;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use repository::{
    BidRepository, CaseFilter, CaseRepository, Store, TrackerFilter, TrackerRepository,
};
pub use sqlite::SqliteStore;

/// Format of issued case numbers: `C-1001`, `C-1002`, ...
pub(crate) const FIRST_CASE_SEQUENCE: u64 = 1001;

pub(crate) fn case_number(seq: u64) -> String {
    format!("C-{}", seq)
}
