//! Gryork Scheduler
//!
//! Periodic driver for the time-based parts of the lifecycle. Each pass
//! runs the SLA tick and then the case dormancy sweep. Both are
//! idempotent, so overlapping passes (two instances, or a retry after a
//! crash) only ever repeat no-ops.

mod dormancy;
mod runner;

pub use dormancy::{sweep_dormant, SweepReport};
pub use runner::{Scheduler, SchedulerConfig, SchedulerHandle, SchedulerReport};
