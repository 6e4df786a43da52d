//! Sessions and unit of work for strata-orm
//!
//! This crate ties the lower layers together:
//! - Orm: shared factory holding registry, backend and encoding
//! - EntityManager: per-session identity map, snapshots and flush
//! - EntityRef: shared handle to a managed entity's live state
//! - Filter / FindOptions: equality queries
//! - OrmConfig: TOML configuration
//!
//! There is no process-wide session. Every session is created explicitly
//! with [`Orm::fork`] and owns its identity map and snapshots.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod entity;
pub mod filter;
pub mod orm;
pub mod session;
pub mod snapshot;

pub use config::{LimitsConfig, OrmConfig};
pub use entity::EntityRef;
pub use filter::{Filter, FindOptions};
pub use orm::{Orm, OrmBuilder};
pub use session::{EntityManager, EntityStatus, FlushSummary};
pub use snapshot::{capture, EntitySnapshot};
