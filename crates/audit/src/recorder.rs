//! Audit recorder

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::entry::AuditEntry;
use crate::error::AuditResult;
use crate::export::{self, ExportFormat};
use crate::query::{AuditPage, AuditQuery, AuditStats, DEFAULT_PAGE_SIZE};
use crate::sink::AuditSink;

/// Front door for audit writes and reads
///
/// Writes never fail the caller; see the crate docs.
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
    failed_writes: AtomicU64,
    page_size: usize,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            failed_writes: AtomicU64::new(0),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Append an entry; sink failures are logged and counted, never returned
    pub fn record(&self, entry: AuditEntry) {
        if let Err(e) = self.sink.append(&entry) {
            self.failed_writes.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                target: "gryork::audit",
                error = %e,
                action = %entry.action,
                entity_type = %entry.entity_type,
                entity_id = %entry.entity_id,
                user_id = %entry.user_id,
                "Audit write failed"
            );
        }
    }

    /// Number of entries lost to sink failures since start-up
    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::Relaxed)
    }

    pub fn query(&self, query: &AuditQuery) -> AuditResult<AuditPage> {
        Ok(query.paginate(self.sink.entries()?, self.page_size))
    }

    pub fn stats(&self, days: u32, now: DateTime<Utc>) -> AuditResult<AuditStats> {
        Ok(AuditStats::compute(&self.sink.entries()?, days, now))
    }

    /// Export every entry matching `query` (pagination ignored)
    pub fn export(&self, query: &AuditQuery, format: ExportFormat) -> AuditResult<String> {
        let entries = query.filter(self.sink.entries()?);
        export::export(&entries, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::AuditAction;
    use crate::error::AuditError;
    use crate::sink::MemoryAuditSink;

    struct UnavailableSink;

    impl AuditSink for UnavailableSink {
        fn append(&self, _entry: &AuditEntry) -> AuditResult<()> {
            Err(AuditError::Unavailable("disk full".to_string()))
        }

        fn entries(&self) -> AuditResult<Vec<AuditEntry>> {
            Err(AuditError::Unavailable("disk full".to_string()))
        }
    }

    fn entry() -> AuditEntry {
        AuditEntry::system(AuditAction::SlaEscalated, "sla_tracker", "t1", "escalated", Utc::now())
    }

    #[test]
    fn test_record_and_query() {
        let recorder = AuditRecorder::new(Arc::new(MemoryAuditSink::new()));
        recorder.record(entry());
        recorder.record(entry());

        let page = recorder.query(&AuditQuery::default()).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(recorder.failed_writes(), 0);
    }

    #[test]
    fn test_sink_failure_is_swallowed_and_counted() {
        let recorder = AuditRecorder::new(Arc::new(UnavailableSink));
        recorder.record(entry());
        recorder.record(entry());
        assert_eq!(recorder.failed_writes(), 2);

        // Reads still report the outage
        assert!(recorder.query(&AuditQuery::default()).is_err());
    }

    #[test]
    fn test_export_ignores_pagination() {
        let recorder = AuditRecorder::new(Arc::new(MemoryAuditSink::new())).with_page_size(1);
        for _ in 0..3 {
            recorder.record(entry());
        }
        let query = AuditQuery {
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(recorder.query(&query).unwrap().entries.len(), 1);

        let csv = recorder.export(&query, ExportFormat::Csv).unwrap();
        assert_eq!(csv.lines().count(), 4);
    }
}
