//! Application state - wires the components together

use std::sync::Arc;

use anyhow::{Context, Result};
use gryork_audit::{AuditRecorder, AuditSink, JsonlAuditSink, MemoryAuditSink};
use gryork_bids::BidLedger;
use gryork_core::{Clock, SystemClock};
use gryork_scheduler::Scheduler;
use gryork_sla::{LogNotifier, SlaEngine};
use gryork_store::{MemoryStore, SqliteStore, Store};
use gryork_workflow::TransitionAuthority;

use crate::config::{AppConfig, StorageKind};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub audit: Arc<AuditRecorder>,
    pub sla: Arc<SlaEngine>,
    pub authority: Arc<TransitionAuthority>,
    pub ledger: Arc<BidLedger>,
    pub scheduler: Arc<Scheduler>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Open the configured backends under `data_dir`
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let (store, sink): (Arc<dyn Store>, Arc<dyn AuditSink>) = match config.storage {
            StorageKind::Memory => (
                Arc::new(MemoryStore::new()),
                Arc::new(MemoryAuditSink::new()),
            ),
            StorageKind::Sqlite => {
                std::fs::create_dir_all(&config.data_dir).with_context(|| {
                    format!("creating data dir {}", config.data_dir.display())
                })?;
                let store = SqliteStore::new(config.database_path())
                    .context("opening case store")?;
                let sink =
                    JsonlAuditSink::open(config.audit_log_path()).context("opening audit log")?;
                (Arc::new(store), Arc::new(sink))
            }
        };

        tracing::info!(
            storage = ?config.storage,
            data_dir = %config.data_dir.display(),
            "Opened storage"
        );
        Self::assemble(config, store, sink, Arc::new(SystemClock))
    }

    /// Build the component graph over the given backends
    pub fn assemble(
        config: &AppConfig,
        store: Arc<dyn Store>,
        sink: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let audit = Arc::new(AuditRecorder::new(sink).with_page_size(config.audit.page_size));
        let sla = Arc::new(
            SlaEngine::new(
                store.clone(),
                audit.clone(),
                clock.clone(),
                Arc::new(LogNotifier),
                config.sla.clone(),
            )
            .map_err(|e| anyhow::anyhow!("invalid sla config: {}", e))?,
        );
        let authority = Arc::new(TransitionAuthority::new(
            store.clone(),
            sla.clone(),
            audit.clone(),
            clock.clone(),
        ));
        let ledger = Arc::new(BidLedger::new(
            store.clone(),
            authority.clone(),
            audit.clone(),
            clock.clone(),
        ));
        let scheduler = Arc::new(Scheduler::new(
            sla.clone(),
            store.clone(),
            audit.clone(),
            clock.clone(),
            config.scheduler.clone(),
        ));

        Ok(Self {
            store,
            audit,
            sla,
            authority,
            ledger,
            scheduler,
            clock,
        })
    }
}
