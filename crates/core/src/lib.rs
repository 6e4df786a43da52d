//! Core types for strata-orm
//!
//! This crate defines the foundational types used throughout the system:
//! - Value: live in-memory values bound to entity properties (objects with
//!   prototypes, shared arrays, typed leaves)
//! - CanonicalValue: storage-agnostic value tree
//! - TypedLeaf / LeafKind: datetimes, dates, uuids and bytes
//! - JsonPath / PathPattern: addressing nested locations
//! - Metadata: entity and property declarations, registry
//! - EntityId: primary keys
//! - Limits and the Error hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod error;
pub mod leaf;
pub mod limits;
pub mod live;
pub mod metadata;
pub mod path;
pub mod types;

pub use canonical::CanonicalValue;
pub use error::{Error, Result};
pub use leaf::{LeafKind, TypedLeaf};
pub use limits::{LimitError, Limits, DEFAULT_MAX_NESTING_DEPTH, DEFAULT_MAX_PATH_LENGTH};
pub use live::{Array, NativeHandle, Object, Value};
pub use metadata::{
    EntityMetadata, EntityMetadataBuilder, JsonHint, MetadataRegistry, MetadataRegistryBuilder,
    PropertyKind, PropertyMetadata, ScalarType, PRIMARY_KEY,
};
pub use path::{JsonPath, PathParseError, PathPattern, PathSegment, PatternSegment};
pub use types::EntityId;
