//! strata-orm - entity mapper with JSON properties that keep their shape
//!
//! Entities declare scalar and JSON properties in a static registry. A JSON
//! property holds an arbitrary object tree; only its own fields are ever
//! persisted (never fields reached through a prototype), and typed leaves
//! such as datetimes survive the trip through either backend.
//!
//! # Quick Start
//!
//! ```ignore
//! use strata_orm::{
//!     EntityMetadata, Filter, MetadataRegistry, Object, Orm, OrmConfig, PropertyMetadata,
//!     ScalarType,
//! };
//!
//! let registry = MetadataRegistry::builder()
//!     .register(
//!         EntityMetadata::builder("User")
//!             .property(PropertyMetadata::scalar("email", ScalarType::String).unique())
//!             .property(PropertyMetadata::json("devices"))
//!             .build(),
//!     )
//!     .build()?;
//! let orm = Orm::open(OrmConfig::relational(), registry)?;
//!
//! let mut em = orm.fork();
//! em.create("User", [("email", "a@x".into()), ("devices", Object::new().into())])?;
//! em.flush().await?;
//!
//! let mut other = orm.fork();
//! let user = other.find_one_or_fail("User", &Filter::eq("email", "a@x")).await?;
//! ```
//!
//! # Architecture
//!
//! - `strata-core`: live and canonical values, metadata, paths, errors
//! - `strata-storage`: document and SQLite backends
//! - `strata-mapping`: extraction, codecs, encodings, change sets
//! - `strata-engine`: `Orm`, sessions, flush

pub use strata_core::{
    Array, CanonicalValue, EntityId, EntityMetadata, Error, JsonHint, JsonPath, LeafKind, Limits,
    MetadataRegistry, NativeHandle, Object, PropertyKind, PropertyMetadata, Result, ScalarType,
    TypedLeaf, Value,
};
pub use strata_engine::{
    EntityManager, EntityRef, EntitySnapshot, EntityStatus, Filter, FindOptions, FlushSummary,
    LimitsConfig, Orm, OrmBuilder, OrmConfig,
};
pub use strata_mapping::{Change, ChangeOp, ChangeSet, CodecRegistry, LeafCodec};
pub use strata_storage::{Backend, BackendKind, DocumentStore, RelationalStore};
