//! Error types for strata-orm
//!
//! Every layer reports failures through [`Error`]. We use `thiserror` for
//! `Display` and `Error` implementations.
//!
//! | Variant | Raised by | Retryable |
//! |---------|-----------|-----------|
//! | `UnsupportedValueKind` | extractor, scalar checks | no |
//! | `CyclicValue` | extractor | no |
//! | `Hydration` | decoding a stored payload | no |
//! | `Conflict` | unique, primary-key or version violation at flush | yes |
//! | `NotFound` | `find_one_or_fail`, `refresh` | no |
//! | `InvalidInput` | unknown entity/property, type mismatch, bad filter | no |
//! | `LimitExceeded` | nesting or path limits | no |
//! | `Storage` | any other backend failure | depends |
//! | `Config` | configuration parsing | no |

use crate::limits::LimitError;
use crate::path::JsonPath;
use thiserror::Error;

/// Result type alias for strata-orm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for strata-orm
#[derive(Debug, Error)]
pub enum Error {
    /// A value that is neither a container, a scalar, nor a registered typed leaf
    #[error("unsupported value kind '{kind}' at {path}")]
    UnsupportedValueKind {
        /// Location of the offending value
        path: JsonPath,
        /// Human-readable kind of the value
        kind: String,
    },

    /// A container reachable from itself
    #[error("cyclic value at {path}")]
    CyclicValue {
        /// Location where the cycle closes
        path: JsonPath,
    },

    /// A stored payload could not be decoded
    #[error("hydration failed at {path}: {reason}")]
    Hydration {
        /// Location of the offending payload
        path: JsonPath,
        /// What was wrong with it
        reason: String,
    },

    /// Unique, primary-key or version constraint violated at flush
    #[error("conflict on {entity}: {reason}")]
    Conflict {
        /// Entity (or collection) the write targeted
        entity: String,
        /// Constraint that was violated
        reason: String,
    },

    /// Lookup found no matching entity
    #[error("{entity} not found: {filter}")]
    NotFound {
        /// Entity name
        entity: String,
        /// Rendered filter
        filter: String,
    },

    /// Invalid argument or state
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// What was invalid
        reason: String,
    },

    /// Nesting or path limit exceeded
    #[error("limit exceeded: {0}")]
    LimitExceeded(#[from] LimitError),

    /// Backend failure that is not a constraint violation
    #[error("storage error: {message}")]
    Storage {
        /// Backend message
        message: String,
    },

    /// Invalid configuration
    #[error("configuration error: {reason}")]
    Config {
        /// What was invalid
        reason: String,
    },
}

impl Error {
    /// Create an `InvalidInput` error
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Error::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Create a `Hydration` error
    pub fn hydration(path: JsonPath, reason: impl Into<String>) -> Self {
        Error::Hydration {
            path,
            reason: reason.into(),
        }
    }

    /// Create an `UnsupportedValueKind` error
    pub fn unsupported(path: JsonPath, kind: impl Into<String>) -> Self {
        Error::UnsupportedValueKind {
            path,
            kind: kind.into(),
        }
    }

    /// Create a `Conflict` error
    pub fn conflict(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Conflict {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    /// Create a `Storage` error
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
        }
    }

    /// Create a `Config` error
    pub fn config(reason: impl Into<String>) -> Self {
        Error::Config {
            reason: reason.into(),
        }
    }

    /// True for constraint violations
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// True when a lookup found nothing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// True when the caller may retry after reconciling
    pub fn is_retryable(&self) -> bool {
        self.is_conflict()
    }

    /// Path carried by the error, if any
    pub fn path(&self) -> Option<&JsonPath> {
        match self {
            Error::UnsupportedValueKind { path, .. }
            | Error::CyclicValue { path }
            | Error::Hydration { path, .. } => Some(path),
            _ => None,
        }
    }
}
