//! SQLite store
//!
//! Records are kept as JSON documents next to the columns the store
//! filters on (`status`, `case_id`) and the authoritative `version`.
//! Updates are `UPDATE ... WHERE id = ? AND version = ?`; zero affected
//! rows means either a missing record or a lost race.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use gryork_core::{Actor, Bid, BidStatus, Case, CaseStatus, NewCase, SlaStatus, SlaTracker};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;

use crate::error::{StoreError, StoreResult};
use crate::repository::{
    BidRepository, CaseFilter, CaseRepository, TrackerFilter, TrackerRepository,
};
use crate::{case_number, FIRST_CASE_SEQUENCE};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given database path
    pub fn new<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        tracing::debug!(path = %path.display(), "Opened SQLite store");
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cases (
                id TEXT PRIMARY KEY,
                case_seq INTEGER NOT NULL UNIQUE,
                case_number TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                version INTEGER NOT NULL,
                body TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_cases_status ON cases(status);

            CREATE TABLE IF NOT EXISTS sla_trackers (
                id TEXT PRIMARY KEY,
                case_id TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                version INTEGER NOT NULL,
                body TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sla_trackers_status ON sla_trackers(status);
            CREATE INDEX IF NOT EXISTS idx_sla_trackers_case ON sla_trackers(case_id);

            CREATE TABLE IF NOT EXISTS bids (
                id TEXT PRIMARY KEY,
                case_id TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                version INTEGER NOT NULL,
                body TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_bids_case ON bids(case_id);",
        )?;
        Ok(())
    }
}

/// Parse a stored document and cross-check its status column
fn decode<T: DeserializeOwned>(
    entity: &'static str,
    id: &str,
    body: &str,
    status_column: &str,
    status_of: impl Fn(&T) -> &'static str,
    version: i64,
) -> StoreResult<(T, u64)> {
    let record: T = serde_json::from_str(body).map_err(|e| {
        StoreError::Integrity(format!("{} {} has an unreadable document: {}", entity, id, e))
    })?;
    if status_of(&record) != status_column {
        return Err(StoreError::Integrity(format!(
            "{} {} status column '{}' disagrees with document '{}'",
            entity,
            id,
            status_column,
            status_of(&record)
        )));
    }
    Ok((record, version as u64))
}

fn parse_status<T: FromStr>(entity: &'static str, value: &str) -> StoreResult<T> {
    T::from_str(value)
        .map_err(|_| StoreError::Integrity(format!("unknown {} status '{}'", entity, value)))
}

/// Listings skip a row that fails to decode so one bad record cannot hide
/// the rest; direct reads still surface the `Integrity` error
fn readable<T>(entity: &'static str, id: &str, decoded: StoreResult<T>) -> Option<T> {
    match decoded {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::error!(entity = entity, id = %id, error = %e, "Skipping unreadable record");
            None
        }
    }
}

/// Resolve a zero-row conditional update into NotFound or Conflict
fn explain_missed_update(
    conn: &Connection,
    table: &str,
    entity: &'static str,
    id: &str,
    expected: u64,
) -> StoreError {
    let sql = format!("SELECT version FROM {} WHERE id = ?1", table);
    match conn
        .query_row(&sql, params![id], |row| row.get::<_, i64>(0))
        .optional()
    {
        Ok(Some(actual)) => StoreError::Conflict {
            entity,
            id: id.to_string(),
            expected,
            actual: actual as u64,
        },
        Ok(None) => StoreError::not_found(entity, id),
        Err(e) => StoreError::Database(e),
    }
}

impl CaseRepository for SqliteStore {
    fn insert_case(
        &self,
        new_case: NewCase,
        created_by: &Actor,
        at: DateTime<Utc>,
    ) -> StoreResult<Case> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let last: Option<i64> =
            tx.query_row("SELECT MAX(case_seq) FROM cases", [], |row| row.get(0))?;
        let seq = match last {
            Some(last) => last as u64 + 1,
            None => FIRST_CASE_SEQUENCE,
        };

        let mut case = Case::open(
            uuid::Uuid::new_v4().to_string(),
            case_number(seq),
            new_case,
            created_by,
            at,
        );
        case.version = 1;

        tx.execute(
            "INSERT INTO cases (id, case_seq, case_number, status, version, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                case.id,
                seq as i64,
                case.case_number,
                case.status.as_str(),
                case.version as i64,
                serde_json::to_string(&case)?,
            ],
        )?;
        tx.commit()?;

        Ok(case)
    }

    fn get_case(&self, id: &str) -> StoreResult<Case> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT status, version, body FROM cases WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("case", id))?;

        let _: CaseStatus = parse_status("case", &row.0)?;
        let (mut case, version) =
            decode::<Case>("case", id, &row.2, &row.0, |c| c.status.as_str(), row.1)?;
        case.version = version;
        Ok(case)
    }

    fn list_cases(&self, filter: &CaseFilter) -> StoreResult<Vec<Case>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, status, version, body FROM cases ORDER BY case_seq")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut cases = Vec::new();
        for (id, status, version, body) in rows {
            let decoded = parse_status::<CaseStatus>("case", &status).and_then(|_| {
                decode::<Case>("case", &id, &body, &status, |c| c.status.as_str(), version)
            });
            let Some((mut case, version)) = readable("case", &id, decoded) else {
                continue;
            };
            case.version = version;
            if filter.matches(&case) {
                cases.push(case);
            }
        }
        Ok(cases)
    }

    fn update_case(&self, case: &Case) -> StoreResult<Case> {
        let conn = self.conn()?;
        let mut next = case.clone();
        next.version = case.version + 1;

        let rows = conn.execute(
            "UPDATE cases SET status = ?1, version = ?2, body = ?3
             WHERE id = ?4 AND version = ?5",
            params![
                next.status.as_str(),
                next.version as i64,
                serde_json::to_string(&next)?,
                case.id,
                case.version as i64,
            ],
        )?;

        if rows == 0 {
            return Err(explain_missed_update(&conn, "cases", "case", &case.id, case.version));
        }
        Ok(next)
    }
}

impl TrackerRepository for SqliteStore {
    fn insert_tracker(&self, tracker: &SlaTracker) -> StoreResult<SlaTracker> {
        let conn = self.conn()?;
        let mut stored = tracker.clone();
        stored.version = 1;

        conn.execute(
            "INSERT INTO sla_trackers (id, case_id, status, created_at, version, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                stored.id,
                stored.case_id,
                stored.status.as_str(),
                stored.created_at.to_rfc3339(),
                stored.version as i64,
                serde_json::to_string(&stored)?,
            ],
        )?;
        Ok(stored)
    }

    fn get_tracker(&self, id: &str) -> StoreResult<SlaTracker> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT status, version, body FROM sla_trackers WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("sla tracker", id))?;

        let _: SlaStatus = parse_status("sla tracker", &row.0)?;
        let (mut tracker, version) = decode::<SlaTracker>(
            "sla tracker",
            id,
            &row.2,
            &row.0,
            |t| t.status.as_str(),
            row.1,
        )?;
        tracker.version = version;
        Ok(tracker)
    }

    fn list_trackers(&self, filter: &TrackerFilter) -> StoreResult<Vec<SlaTracker>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, status, version, body FROM sla_trackers ORDER BY created_at, id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut trackers = Vec::new();
        for (id, status, version, body) in rows {
            let decoded = parse_status::<SlaStatus>("sla tracker", &status).and_then(|_| {
                decode::<SlaTracker>(
                    "sla tracker",
                    &id,
                    &body,
                    &status,
                    |t| t.status.as_str(),
                    version,
                )
            });
            let Some((mut tracker, version)) = readable("sla tracker", &id, decoded) else {
                continue;
            };
            tracker.version = version;
            if filter.matches(&tracker) {
                trackers.push(tracker);
            }
        }
        Ok(trackers)
    }

    fn update_tracker(&self, tracker: &SlaTracker) -> StoreResult<SlaTracker> {
        let conn = self.conn()?;
        let mut next = tracker.clone();
        next.version = tracker.version + 1;

        let rows = conn.execute(
            "UPDATE sla_trackers SET status = ?1, version = ?2, body = ?3
             WHERE id = ?4 AND version = ?5",
            params![
                next.status.as_str(),
                next.version as i64,
                serde_json::to_string(&next)?,
                tracker.id,
                tracker.version as i64,
            ],
        )?;

        if rows == 0 {
            return Err(explain_missed_update(
                &conn,
                "sla_trackers",
                "sla tracker",
                &tracker.id,
                tracker.version,
            ));
        }
        Ok(next)
    }
}

impl BidRepository for SqliteStore {
    fn insert_bid(&self, bid: &Bid) -> StoreResult<Bid> {
        let conn = self.conn()?;
        let mut stored = bid.clone();
        stored.version = 1;

        conn.execute(
            "INSERT INTO bids (id, case_id, status, created_at, version, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                stored.id,
                stored.case_id,
                stored.status.as_str(),
                stored.created_at.to_rfc3339(),
                stored.version as i64,
                serde_json::to_string(&stored)?,
            ],
        )?;
        Ok(stored)
    }

    fn get_bid(&self, id: &str) -> StoreResult<Bid> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT status, version, body FROM bids WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("bid", id))?;

        let _: BidStatus = parse_status("bid", &row.0)?;
        let (mut bid, version) =
            decode::<Bid>("bid", id, &row.2, &row.0, |b| b.status.as_str(), row.1)?;
        bid.version = version;
        Ok(bid)
    }

    fn list_bids_for_case(&self, case_id: &str) -> StoreResult<Vec<Bid>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, status, version, body FROM bids
             WHERE case_id = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt
            .query_map(params![case_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut bids = Vec::new();
        for (id, status, version, body) in rows {
            let decoded = parse_status::<BidStatus>("bid", &status).and_then(|_| {
                decode::<Bid>("bid", &id, &body, &status, |b| b.status.as_str(), version)
            });
            let Some((mut bid, version)) = readable("bid", &id, decoded) else {
                continue;
            };
            bid.version = version;
            bids.push(bid);
        }
        Ok(bids)
    }

    fn update_bid(&self, bid: &Bid) -> StoreResult<Bid> {
        let conn = self.conn()?;
        let mut next = bid.clone();
        next.version = bid.version + 1;

        let rows = conn.execute(
            "UPDATE bids SET status = ?1, version = ?2, body = ?3
             WHERE id = ?4 AND version = ?5",
            params![
                next.status.as_str(),
                next.version as i64,
                serde_json::to_string(&next)?,
                bid.id,
                bid.version as i64,
            ],
        )?;

        if rows == 0 {
            return Err(explain_missed_update(&conn, "bids", "bid", &bid.id, bid.version));
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gryork_core::{Role, SlaEntityType};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn sales() -> Actor {
        Actor::new("sales-1", Role::Sales)
    }

    fn new_case() -> NewCase {
        NewCase {
            sub_contractor_id: "SC-1".to_string(),
            epc_id: "EPC-1".to_string(),
            bill_id: Some("BILL-7".to_string()),
            cwcrf_id: Some("CWCRF-7".to_string()),
        }
    }

    #[test]
    fn test_case_roundtrip_and_numbers() {
        let store = SqliteStore::in_memory().unwrap();
        let a = store.insert_case(new_case(), &sales(), Utc::now()).unwrap();
        let b = store.insert_case(new_case(), &sales(), Utc::now()).unwrap();

        assert_eq!(a.case_number, "C-1001");
        assert_eq!(b.case_number, "C-1002");

        let loaded = store.get_case(&a.id).unwrap();
        assert_eq!(loaded, a);
    }

    #[test]
    fn test_conditional_update() {
        let store = SqliteStore::in_memory().unwrap();
        let case = store.insert_case(new_case(), &sales(), Utc::now()).unwrap();

        let mut first = case.clone();
        first.record_status(CaseStatus::CredentialsCreated, &sales(), None, Utc::now());
        let stored = store.update_case(&first).unwrap();
        assert_eq!(stored.version, 2);

        let mut stale = case.clone();
        stale.record_status(CaseStatus::Cancelled, &sales(), None, Utc::now());
        assert!(matches!(
            store.update_case(&stale),
            Err(StoreError::Conflict { expected: 1, actual: 2, .. })
        ));

        let mut ghost = case.clone();
        ghost.id = "missing".to_string();
        assert!(matches!(
            store.update_case(&ghost),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_out_of_vocabulary_status_is_integrity_error() {
        let store = SqliteStore::in_memory().unwrap();
        let case = store.insert_case(new_case(), &sales(), Utc::now()).unwrap();

        store
            .conn()
            .unwrap()
            .execute(
                "UPDATE cases SET status = 'ALMOST_DONE' WHERE id = ?1",
                params![case.id],
            )
            .unwrap();

        assert!(matches!(
            store.get_case(&case.id),
            Err(StoreError::Integrity(_))
        ));
    }

    #[test]
    fn test_listings_skip_unreadable_rows() {
        let store = SqliteStore::in_memory().unwrap();
        let healthy = store.insert_case(new_case(), &sales(), Utc::now()).unwrap();
        let garbled = store.insert_case(new_case(), &sales(), Utc::now()).unwrap();
        let drifted = store.insert_case(new_case(), &sales(), Utc::now()).unwrap();

        let tracker = |id: &str, case_id: &str| {
            SlaTracker::new(
                id.to_string(),
                case_id.to_string(),
                SlaEntityType::Case,
                case_id.to_string(),
                Some(CaseStatus::RmtQueue),
                "RMT_REVIEW".to_string(),
                [3, 7, 10, 14],
                Utc::now(),
            )
        };
        store.insert_tracker(&tracker("SLA-1", &healthy.id)).unwrap();
        store.insert_tracker(&tracker("SLA-2", &garbled.id)).unwrap();
        store.insert_tracker(&tracker("SLA-3", &drifted.id)).unwrap();

        {
            let conn = store.conn().unwrap();
            conn.execute(
                "UPDATE cases SET body = '{not json' WHERE id = ?1",
                params![garbled.id],
            )
            .unwrap();
            conn.execute(
                "UPDATE cases SET status = 'ALMOST_DONE' WHERE id = ?1",
                params![drifted.id],
            )
            .unwrap();
            conn.execute("UPDATE sla_trackers SET status = 'PAUSED' WHERE id = 'SLA-2'", [])
                .unwrap();
            conn.execute(
                "UPDATE sla_trackers SET body = '[]' WHERE id = 'SLA-3'",
                [],
            )
            .unwrap();
        }

        let cases = store.list_cases(&CaseFilter::default()).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].id, healthy.id);

        let trackers = store.list_trackers(&TrackerFilter::default()).unwrap();
        assert_eq!(trackers.len(), 1);
        assert_eq!(trackers[0].id, "SLA-1");

        assert!(matches!(
            store.get_case(&garbled.id),
            Err(StoreError::Integrity(_))
        ));
        assert!(matches!(
            store.get_tracker("SLA-3"),
            Err(StoreError::Integrity(_))
        ));
    }

    #[test]
    fn test_trackers_and_bids() {
        let store = SqliteStore::in_memory().unwrap();
        let case = store.insert_case(new_case(), &sales(), Utc::now()).unwrap();

        let tracker = SlaTracker::new(
            "SLA-1".to_string(),
            case.id.clone(),
            SlaEntityType::Case,
            case.id.clone(),
            Some(CaseStatus::RmtQueue),
            "RMT_REVIEW".to_string(),
            [3, 7, 10, 14],
            Utc::now(),
        );
        let stored = store.insert_tracker(&tracker).unwrap();
        assert_eq!(stored.version, 1);

        let mut reminded = stored.clone();
        reminded.status = SlaStatus::Reminder1Sent;
        store.update_tracker(&reminded).unwrap();

        let active = store
            .list_trackers(&TrackerFilter::with_statuses(&[SlaStatus::Active]))
            .unwrap();
        assert!(active.is_empty());
        let for_case = store.list_trackers(&TrackerFilter::for_case(&case.id)).unwrap();
        assert_eq!(for_case[0].status, SlaStatus::Reminder1Sent);

        let bid = Bid::new(
            "BID-1".to_string(),
            case.id.clone(),
            dec!(500000),
            30,
            "nbfc-1".to_string(),
            Utc::now(),
        );
        store.insert_bid(&bid).unwrap();
        let bids = store.list_bids_for_case(&case.id).unwrap();
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].bid_amount, dec!(500000));
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gryork.db");

        let id = {
            let store = SqliteStore::new(&path).unwrap();
            store.insert_case(new_case(), &sales(), Utc::now()).unwrap().id
        };

        let reopened = SqliteStore::new(&path).unwrap();
        let case = reopened.get_case(&id).unwrap();
        assert_eq!(case.case_number, "C-1001");
        let next = reopened.insert_case(new_case(), &sales(), Utc::now()).unwrap();
        assert_eq!(next.case_number, "C-1002");
    }
}
