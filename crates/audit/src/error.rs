//! Audit errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Broken chain at sequence {sequence}: {reason}")]
    BrokenChain { sequence: u64, reason: String },

    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),
}

pub type AuditResult<T> = Result<T, AuditError>;
