//! Lifecycle error taxonomy

use serde::{Deserialize, Serialize};
use strum_macros::{Display, IntoStaticStr};
use thiserror::Error;

use crate::actor::Role;
use crate::status::CaseStatus;

/// Errors surfaced by every lifecycle operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("No transition from {from} to {to}")]
    InvalidTransition { from: CaseStatus, to: CaseStatus },

    #[error("Role '{role}' is not permitted to {action}")]
    Forbidden { role: Role, action: String },

    #[error("{entity} {id} was modified concurrently (expected version {expected}, found {actual})")]
    Conflict {
        entity: String,
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Invalid stage: {0}")]
    InvalidStage(String),

    #[error("Commercial terms already locked for case {0}")]
    AlreadyLocked(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Stable machine-readable kind of a [`LifecycleError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidTransition,
    Forbidden,
    Conflict,
    InvalidStage,
    AlreadyLocked,
    NotFound,
    Validation,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            LifecycleError::Forbidden { .. } => ErrorKind::Forbidden,
            LifecycleError::Conflict { .. } => ErrorKind::Conflict,
            LifecycleError::InvalidStage(_) => ErrorKind::InvalidStage,
            LifecycleError::AlreadyLocked(_) => ErrorKind::AlreadyLocked,
            LifecycleError::NotFound { .. } => ErrorKind::NotFound,
            LifecycleError::Validation(_) => ErrorKind::Validation,
            LifecycleError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn forbidden(role: Role, action: impl Into<String>) -> Self {
        LifecycleError::Forbidden {
            role,
            action: action.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        LifecycleError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, LifecycleError::Conflict { .. })
    }
}

/// Result type for lifecycle operations
pub type LifecycleResult<T> = Result<T, LifecycleError>;
