//! Storage error types
//!
//! Backends report failures through [`StorageError`]. Constraint violations
//! (unique index, primary key, version check) become
//! [`strata_core::Error::Conflict`] at the crate boundary; everything else
//! becomes [`strata_core::Error::Storage`].

use thiserror::Error;

/// Result type alias for backend operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Error type for storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    /// A unique field already holds the value for another row
    #[error("unique constraint violated on {collection}.{field}")]
    UniqueViolation {
        /// Collection or table
        collection: String,
        /// Field or column
        field: String,
    },

    /// A row with this primary key already exists
    #[error("duplicate primary key '{id}' in {collection}")]
    DuplicateKey {
        /// Collection or table
        collection: String,
        /// Primary key
        id: String,
    },

    /// Stored version differs from the expected one
    #[error("version mismatch on {collection}/{id}: expected {expected}, found {actual:?}")]
    VersionMismatch {
        /// Collection or table
        collection: String,
        /// Primary key
        id: String,
        /// Version the writer loaded
        expected: u64,
        /// Version currently stored
        actual: Option<u64>,
    },

    /// Update targeted a row that does not exist
    #[error("row '{id}' missing from {collection}")]
    Missing {
        /// Collection or table
        collection: String,
        /// Primary key
        id: String,
    },

    /// Collection was never created
    #[error("unknown collection '{0}'")]
    UnknownCollection(String),

    /// Operation or value not supported by this backend
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Path update could not be applied to the stored document
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// Rendered path
        path: String,
        /// What went wrong
        reason: String,
    },

    /// SQLite failure
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Stored data does not have the expected shape
    #[error("corrupt row in {collection}: {reason}")]
    Corrupt {
        /// Collection or table
        collection: String,
        /// What was wrong
        reason: String,
    },
}

impl StorageError {
    /// True for unique, primary-key and version violations
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StorageError::UniqueViolation { .. }
                | StorageError::DuplicateKey { .. }
                | StorageError::VersionMismatch { .. }
                | StorageError::Missing { .. }
        )
    }
}

impl From<StorageError> for strata_core::Error {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::UniqueViolation { collection, .. }
            | StorageError::DuplicateKey { collection, .. }
            | StorageError::VersionMismatch { collection, .. }
            | StorageError::Missing { collection, .. } => {
                strata_core::Error::conflict(collection.clone(), err.to_string())
            }
            _ => strata_core::Error::storage(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_becomes_conflict() {
        let err: strata_core::Error = StorageError::UniqueViolation {
            collection: "user".to_string(),
            field: "email".to_string(),
        }
        .into();
        assert!(err.is_conflict());
        assert!(err.to_string().contains("user.email"));
    }

    #[test]
    fn test_version_mismatch_becomes_conflict() {
        let err: strata_core::Error = StorageError::VersionMismatch {
            collection: "user".to_string(),
            id: "u1".to_string(),
            expected: 1,
            actual: Some(2),
        }
        .into();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_other_errors_become_storage() {
        let err: strata_core::Error = StorageError::UnknownCollection("x".to_string()).into();
        assert!(matches!(err, strata_core::Error::Storage { .. }));
    }
}
