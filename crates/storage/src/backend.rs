//! Backend trait and write operations
//!
//! A [`Backend`] stores rows keyed by a string primary key inside named
//! collections. Writes arrive as a batch of [`WriteOp`]s that is applied
//! atomically: either every op takes effect or none does.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use strata_core::{EntityMetadata, JsonPath};

use crate::doc_value::DocValue;
use crate::error::{StorageError, StorageResult};
use crate::native::{ColumnValue, NativeValue, Selector, StoredRow};

/// Which backend implementation is in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// In-memory document store
    Document,
    /// SQLite
    Relational,
}

impl BackendKind {
    /// Lowercase name, as used in configuration
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Document => "document",
            BackendKind::Relational => "relational",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(BackendKind::Document),
            "relational" | "sqlite" => Ok(BackendKind::Relational),
            other => Err(StorageError::Unsupported(format!("backend '{}'", other))),
        }
    }
}

/// What a backend can do natively
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Accepts path-level `$set` / `$unset` updates
    pub partial_updates: bool,
    /// Stores datetimes natively
    pub native_datetime: bool,
    /// Stores binary natively
    pub native_binary: bool,
}

/// One path-level update inside a document
///
/// Paths start with the top-level field name.
#[derive(Debug, Clone, PartialEq)]
pub enum PathUpdate {
    /// `$set`
    Set(JsonPath, DocValue),
    /// `$unset`
    Unset(JsonPath),
}

/// Body of an update
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Path-level updates (document store)
    Paths(Vec<PathUpdate>),
    /// Whole-column rewrites (relational store); NULL clears a column
    Columns(BTreeMap<String, ColumnValue>),
}

impl Update {
    /// True if the update changes nothing
    pub fn is_empty(&self) -> bool {
        match self {
            Update::Paths(p) => p.is_empty(),
            Update::Columns(c) => c.is_empty(),
        }
    }
}

/// Optimistic-lock check attached to an update or delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionBump {
    /// Version the writer loaded
    pub expected: u64,
    /// Version to store on success
    pub next: u64,
}

/// A single write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert a new row
    Insert {
        /// Target collection
        collection: String,
        /// Primary key
        id: String,
        /// Field values (absent fields are simply not stored)
        fields: BTreeMap<String, NativeValue>,
        /// Initial version, for versioned collections
        version: Option<u64>,
    },
    /// Modify an existing row
    Update {
        /// Target collection
        collection: String,
        /// Primary key
        id: String,
        /// Changes to apply
        update: Update,
        /// Optimistic-lock check
        version: Option<VersionBump>,
    },
    /// Delete a row
    Delete {
        /// Target collection
        collection: String,
        /// Primary key
        id: String,
        /// Version the writer loaded, for versioned collections
        expected_version: Option<u64>,
    },
}

impl WriteOp {
    /// Collection the op targets
    pub fn collection(&self) -> &str {
        match self {
            WriteOp::Insert { collection, .. }
            | WriteOp::Update { collection, .. }
            | WriteOp::Delete { collection, .. } => collection,
        }
    }

    /// Primary key the op targets
    pub fn id(&self) -> &str {
        match self {
            WriteOp::Insert { id, .. } | WriteOp::Update { id, .. } | WriteOp::Delete { id, .. } => id,
        }
    }
}

/// Renders ops in a compact, log-friendly form
impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteOp::Insert {
                collection,
                id,
                fields,
                version,
            } => {
                write!(f, "insert {} id={:?}", collection, id)?;
                for (name, value) in fields {
                    write!(f, " {}={}", name, value)?;
                }
                if let Some(v) = version {
                    write!(f, " version={}", v)?;
                }
                Ok(())
            }
            WriteOp::Update {
                collection,
                id,
                update,
                version,
            } => {
                write!(f, "update {} id={:?}", collection, id)?;
                match update {
                    Update::Paths(paths) => {
                        for p in paths {
                            match p {
                                PathUpdate::Set(path, value) => write!(f, " $set {}={}", path, value)?,
                                PathUpdate::Unset(path) => write!(f, " $unset {}", path)?,
                            }
                        }
                    }
                    Update::Columns(cols) => {
                        for (name, value) in cols {
                            write!(f, " set {}={}", name, value)?;
                        }
                    }
                }
                if let Some(bump) = version {
                    write!(f, " version {}->{}", bump.expected, bump.next)?;
                }
                Ok(())
            }
            WriteOp::Delete {
                collection,
                id,
                expected_version,
            } => {
                write!(f, "delete {} id={:?}", collection, id)?;
                if let Some(v) = expected_version {
                    write!(f, " version={}", v)?;
                }
                Ok(())
            }
        }
    }
}

/// Row counts of an applied batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Rows inserted
    pub inserted: usize,
    /// Rows updated
    pub updated: usize,
    /// Rows deleted
    pub deleted: usize,
}

/// A storage backend shared by every session of an `Orm`
pub trait Backend: Send + Sync + 'static {
    /// Which implementation this is
    fn kind(&self) -> BackendKind;

    /// Native capabilities
    fn capabilities(&self) -> Capabilities;

    /// Create the collection for `entity` if it does not exist
    fn ensure_collection(&self, entity: &EntityMetadata) -> StorageResult<()>;

    /// Drop a collection and all its rows; missing collections are ignored
    fn drop_collection(&self, collection: &str) -> StorageResult<()>;

    /// Rows matching `selector`, ordered by primary key
    fn find(
        &self,
        collection: &str,
        selector: &Selector,
        limit: Option<usize>,
    ) -> StorageResult<Vec<StoredRow>>;

    /// Apply a batch atomically
    fn apply(&self, batch: &[WriteOp]) -> StorageResult<BatchOutcome>;
}
