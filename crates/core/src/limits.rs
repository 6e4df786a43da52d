//! Size limits for extracted values
//!
//! Limits are checked by the value extractor before anything reaches a
//! backend. Violations surface as `Error::LimitExceeded`.

use thiserror::Error;

/// Default maximum nesting depth of a property value
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 100;

/// Default maximum path length in segments
pub const DEFAULT_MAX_PATH_LENGTH: usize = 256;

/// Error type for limit violations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LimitError {
    /// Value nesting exceeds maximum depth
    #[error("value nesting depth {depth} exceeds maximum of {max} levels")]
    NestingTooDeep {
        /// Actual nesting depth
        depth: usize,
        /// Maximum allowed depth
        max: usize,
    },

    /// Path exceeds maximum length
    #[error("path length {length} exceeds maximum of {max} segments")]
    PathTooLong {
        /// Actual path length
        length: usize,
        /// Maximum allowed length
        max: usize,
    },
}

/// Limits applied while extracting property values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum nesting depth (default: 100)
    pub max_nesting_depth: usize,
    /// Maximum path length in segments (default: 256)
    pub max_path_length: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            max_path_length: DEFAULT_MAX_PATH_LENGTH,
        }
    }
}

impl Limits {
    /// Check a container depth against `max_nesting_depth`
    pub fn check_depth(&self, depth: usize) -> Result<(), LimitError> {
        if depth > self.max_nesting_depth {
            Err(LimitError::NestingTooDeep {
                depth,
                max: self.max_nesting_depth,
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_nesting_depth, 100);
        assert_eq!(limits.max_path_length, 256);
    }

    #[test]
    fn test_check_depth() {
        let limits = Limits {
            max_nesting_depth: 2,
            ..Limits::default()
        };
        assert!(limits.check_depth(2).is_ok());
        assert_eq!(
            limits.check_depth(3),
            Err(LimitError::NestingTooDeep { depth: 3, max: 2 })
        );
    }

    #[test]
    fn test_limit_error_display() {
        let err = LimitError::NestingTooDeep { depth: 7, max: 5 };
        assert!(err.to_string().contains("7"));
        assert!(err.to_string().contains("5"));
    }
}
