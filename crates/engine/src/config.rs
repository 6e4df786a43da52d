//! ORM configuration via TOML
//!
//! An `OrmConfig` picks the backend, where a relational database lives,
//! whether individual write ops are logged, and the extraction limits.
//! Every field has a default, so an empty file is a valid configuration
//! (in-memory document store).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strata_core::{Error, Limits, Result};
use strata_storage::BackendKind;

/// Limits section of the configuration
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimitsConfig {
    /// Maximum nesting depth of a property value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_nesting_depth: Option<usize>,
    /// Maximum path length in segments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_path_length: Option<usize>,
}

/// ORM configuration
///
/// # Example
///
/// ```toml
/// backend = "relational"
/// path = "/var/lib/app/orm.db"
/// log_queries = true
///
/// [limits]
/// max_nesting_depth = 64
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrmConfig {
    /// Backend: `"document"` or `"relational"`
    #[serde(default = "default_backend")]
    pub backend: String,
    /// SQLite database file; in-memory when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Log every write op at debug level
    #[serde(default)]
    pub log_queries: bool,
    /// Extraction limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

fn default_backend() -> String {
    "document".to_string()
}

impl Default for OrmConfig {
    fn default() -> Self {
        OrmConfig {
            backend: default_backend(),
            path: None,
            log_queries: false,
            limits: LimitsConfig::default(),
        }
    }
}

impl OrmConfig {
    /// In-memory document store
    pub fn document() -> Self {
        OrmConfig::default()
    }

    /// In-memory SQLite database
    pub fn relational() -> Self {
        OrmConfig {
            backend: BackendKind::Relational.name().to_string(),
            ..OrmConfig::default()
        }
    }

    /// SQLite database stored in `path`
    pub fn relational_file(path: impl Into<PathBuf>) -> Self {
        OrmConfig {
            path: Some(path.into()),
            ..OrmConfig::relational()
        }
    }

    /// Enable or disable per-op logging
    pub fn with_log_queries(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    /// Parse the backend string
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for anything but `"document"`, `"relational"`
    /// or its alias `"sqlite"`.
    pub fn backend_kind(&self) -> Result<BackendKind> {
        self.backend.parse().map_err(|_| {
            Error::config(format!(
                "invalid backend '{}', expected \"document\" or \"relational\"",
                self.backend
            ))
        })
    }

    /// Effective limits, defaults filled in
    pub fn limits(&self) -> Result<Limits> {
        let defaults = Limits::default();
        let limits = Limits {
            max_nesting_depth: self.limits.max_nesting_depth.unwrap_or(defaults.max_nesting_depth),
            max_path_length: self.limits.max_path_length.unwrap_or(defaults.max_path_length),
        };
        if limits.max_nesting_depth == 0 || limits.max_path_length == 0 {
            return Err(Error::config("limits must be greater than zero"));
        }
        Ok(limits)
    }

    /// Check every field eagerly
    pub fn validate(&self) -> Result<()> {
        let kind = self.backend_kind()?;
        if kind == BackendKind::Document && self.path.is_some() {
            return Err(Error::config("'path' is only valid for the relational backend"));
        }
        self.limits()?;
        Ok(())
    }

    /// Default config file content with comments
    pub fn default_toml() -> &'static str {
        r#"# strata-orm configuration
#
# Backend: "document" (default) or "relational"
#   "document"   = in-memory document store, per-path partial updates
#   "relational" = SQLite, JSON properties stored as JSON text
backend = "document"

# SQLite database file (relational backend only). In-memory when absent.
# path = "orm.db"

# Log every write op at debug level (target "strata::flush")
log_queries = false

# [limits]
# max_nesting_depth = 100
# max_path_length = 256
"#
    }

    /// Parse config from a TOML string
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the text does not parse or fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: OrmConfig = toml::from_str(content)
            .map_err(|e| Error::config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Serialize this config to TOML and write it to the given path
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::config(format!(
                "failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
