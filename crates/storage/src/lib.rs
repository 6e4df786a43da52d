//! Storage backends for strata-orm
//!
//! This crate implements the two backends every entity session can target:
//! - DocumentStore: in-memory documents with native datetime/binary values,
//!   path-level `$set`/`$unset` updates and unique indexes
//! - RelationalStore: SQLite tables with JSON properties as TEXT columns,
//!   `UNIQUE` constraints and transactional batches
//!
//! Both implement [`Backend`]: rows keyed by a string primary key, equality
//! selectors, and atomic batches of [`WriteOp`]s.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod doc_value;
pub mod document;
pub mod error;
pub mod native;
pub mod relational;

pub use backend::{
    Backend, BackendKind, BatchOutcome, Capabilities, PathUpdate, Update, VersionBump, WriteOp,
};
pub use doc_value::DocValue;
pub use document::DocumentStore;
pub use error::{StorageError, StorageResult};
pub use native::{ColumnValue, NativeValue, Selector, StoredRow};
pub use relational::RelationalStore;
