//! Audit storage backends
//!
//! A sink only appends and reads back; nothing is ever updated or deleted.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::entry::AuditEntry;
use crate::error::{AuditError, AuditResult};

const GENESIS: &str = "GENESIS";

/// Storage seam for audit rows
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: &AuditEntry) -> AuditResult<()>;

    /// Every stored entry in append order
    fn entries(&self) -> AuditResult<Vec<AuditEntry>>;
}

/// Vec-backed sink (for tests and the in-memory server mode)
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, entry: &AuditEntry) -> AuditResult<()> {
        self.entries
            .write()
            .map_err(|_| AuditError::Unavailable("memory sink lock poisoned".to_string()))?
            .push(entry.clone());
        Ok(())
    }

    fn entries(&self) -> AuditResult<Vec<AuditEntry>> {
        Ok(self
            .entries
            .read()
            .map_err(|_| AuditError::Unavailable("memory sink lock poisoned".to_string()))?
            .clone())
    }
}

/// One line of the JSONL audit file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainedRecord {
    pub sequence: u64,
    pub prev_hash: String,
    pub hash: String,
    pub entry: AuditEntry,
}

/// SHA256 over sequence, previous hash and the serialized entry
fn calculate_hash(sequence: u64, prev_hash: &str, entry: &AuditEntry) -> AuditResult<String> {
    let mut hasher = Sha256::new();
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(serde_json::to_vec(entry)?);
    Ok(hex::encode(hasher.finalize()))
}

/// Verify sequence continuity and hash links of a chain
pub fn verify_chain(records: &[ChainedRecord]) -> AuditResult<()> {
    let mut prev_hash = GENESIS.to_string();

    for (i, record) in records.iter().enumerate() {
        let expected_seq = i as u64 + 1;
        if record.sequence != expected_seq {
            return Err(AuditError::BrokenChain {
                sequence: record.sequence,
                reason: format!("expected sequence {}", expected_seq),
            });
        }
        if record.prev_hash != prev_hash {
            return Err(AuditError::BrokenChain {
                sequence: record.sequence,
                reason: "previous hash does not link".to_string(),
            });
        }
        let calculated = calculate_hash(record.sequence, &record.prev_hash, &record.entry)?;
        if record.hash != calculated {
            return Err(AuditError::BrokenChain {
                sequence: record.sequence,
                reason: "entry hash mismatch".to_string(),
            });
        }
        prev_hash = record.hash.clone();
    }

    Ok(())
}

struct ChainHead {
    file: File,
    sequence: u64,
    last_hash: String,
}

/// Append-only, hash-chained JSONL file
///
/// Each line is a [`ChainedRecord`]. The chain head is restored from the
/// file on open, so restarts keep extending the same chain.
pub struct JsonlAuditSink {
    path: PathBuf,
    head: Mutex<ChainHead>,
}

impl JsonlAuditSink {
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let records = read_records(&path)?;
        let (sequence, last_hash) = match records.last() {
            Some(last) => (last.sequence, last.hash.clone()),
            None => (0, GENESIS.to_string()),
        };

        Ok(Self {
            path,
            head: Mutex::new(ChainHead {
                file,
                sequence,
                last_hash,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> AuditResult<Vec<ChainedRecord>> {
        read_records(&self.path)
    }

    /// Re-read the file and check the whole chain
    pub fn verify(&self) -> AuditResult<usize> {
        let records = self.records()?;
        verify_chain(&records)?;
        Ok(records.len())
    }
}

fn read_records(path: &Path) -> AuditResult<Vec<ChainedRecord>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }

    Ok(records)
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, entry: &AuditEntry) -> AuditResult<()> {
        let mut head = self
            .head
            .lock()
            .map_err(|_| AuditError::Unavailable("audit file lock poisoned".to_string()))?;

        let sequence = head.sequence + 1;
        let hash = calculate_hash(sequence, &head.last_hash, entry)?;
        let record = ChainedRecord {
            sequence,
            prev_hash: head.last_hash.clone(),
            hash,
            entry: entry.clone(),
        };

        let json = serde_json::to_string(&record)?;
        writeln!(head.file, "{}", json)?;
        head.file.flush()?;

        head.sequence = sequence;
        head.last_hash = record.hash;
        Ok(())
    }

    fn entries(&self) -> AuditResult<Vec<AuditEntry>> {
        Ok(self.records()?.into_iter().map(|r| r.entry).collect())
    }
}
