//! Gryork Audit Recorder
//!
//! Append-only record of every state-affecting action.
//!
//! ## Durability is asymmetric
//!
//! [`AuditRecorder::record`] never fails the caller. A sink failure is
//! logged on the `gryork::audit` target and counted, and the business
//! operation that produced the entry stands.
//!
//! ## Key Components
//!
//! - [`entry::AuditEntry`] - immutable audit row
//! - [`sink::AuditSink`] - storage seam; [`MemoryAuditSink`], [`JsonlAuditSink`]
//! - [`query::AuditQuery`] - filtered, paginated retrieval and stats
//! - [`export`] - CSV / JSON export of a filtered set

pub mod entry;
pub mod error;
pub mod export;
pub mod query;
pub mod recorder;
pub mod sink;

pub use entry::{AuditAction, AuditCategory, AuditEntry};
pub use error::{AuditError, AuditResult};
pub use export::ExportFormat;
pub use query::{AuditPage, AuditQuery, AuditStats};
pub use recorder::AuditRecorder;
pub use sink::{verify_chain, AuditSink, ChainedRecord, JsonlAuditSink, MemoryAuditSink};
