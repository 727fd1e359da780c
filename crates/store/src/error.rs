//! Store errors

use gryork_core::LifecycleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} {id} version conflict: expected {expected}, found {actual}")]
    Conflict {
        entity: &'static str,
        id: String,
        expected: u64,
        actual: u64,
    },

    /// A persisted value lies outside its closed vocabulary
    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => LifecycleError::not_found(entity, id),
            StoreError::Conflict {
                entity,
                id,
                expected,
                actual,
            } => LifecycleError::Conflict {
                entity: entity.to_string(),
                id,
                expected,
                actual,
            },
            other => LifecycleError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gryork_core::ErrorKind;

    #[test]
    fn test_conversion_keeps_kind() {
        let conflict = StoreError::Conflict {
            entity: "case",
            id: "c1".to_string(),
            expected: 1,
            actual: 2,
        };
        assert_eq!(LifecycleError::from(conflict).kind(), ErrorKind::Conflict);

        let missing = StoreError::not_found("bid", "BID-9");
        assert_eq!(LifecycleError::from(missing).kind(), ErrorKind::NotFound);

        let integrity = StoreError::Integrity("bad status".to_string());
        assert_eq!(LifecycleError::from(integrity).kind(), ErrorKind::Storage);
    }
}
