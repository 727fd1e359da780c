//! Case dormancy sweep
//!
//! Flags open cases that have not moved for a while. The flag is advisory:
//! status is never touched, and the next committed transition clears it.

use chrono::{DateTime, Duration, Utc};
use gryork_audit::{AuditAction, AuditEntry, AuditRecorder};
use gryork_core::LifecycleResult;
use gryork_store::{CaseFilter, Store, StoreError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub examined: usize,
    pub marked: usize,
    /// Cases that moved between read and write
    pub skipped: usize,
    pub failures: Vec<String>,
}

/// Mark every open, idle case dormant
pub fn sweep_dormant(
    store: &dyn Store,
    audit: &AuditRecorder,
    dormancy_days: u32,
    now: DateTime<Utc>,
) -> LifecycleResult<SweepReport> {
    let cutoff = now - Duration::days(dormancy_days as i64);
    let filter = CaseFilter {
        exclude_terminal: true,
        ..Default::default()
    };
    let idle: Vec<_> = store
        .list_cases(&filter)?
        .into_iter()
        .filter(|c| !c.dormant && c.updated_at <= cutoff)
        .collect();

    let mut report = SweepReport {
        examined: idle.len(),
        ..Default::default()
    };

    for mut case in idle {
        case.dormant = true;
        match store.update_case(&case) {
            Ok(stored) => {
                report.marked += 1;
                tracing::info!(
                    case_id = %stored.id,
                    case_number = %stored.case_number,
                    status = %stored.status,
                    idle_since = %stored.updated_at,
                    "Case marked dormant"
                );
                audit.record(AuditEntry::system(
                    AuditAction::CaseMarkedDormant,
                    "case",
                    &stored.id,
                    format!(
                        "{} idle in {} since {}",
                        stored.case_number,
                        stored.status,
                        stored.updated_at.to_rfc3339()
                    ),
                    now,
                ));
            }
            Err(StoreError::Conflict { .. }) => {
                tracing::debug!(case_id = %case.id, "Case changed during dormancy sweep, skipping");
                report.skipped += 1;
            }
            Err(e) => {
                tracing::warn!(case_id = %case.id, error = %e, "Dormancy sweep failed for case");
                report.failures.push(format!("{}: {}", case.id, e));
            }
        }
    }

    Ok(report)
}
