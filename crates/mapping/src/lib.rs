//! JSON property mapping for strata-orm
//!
//! This crate turns live entity state into stored form and back:
//! - extract: own-fields-only reduction of live values to canonical values
//! - codec: tagged forms for datetimes and other typed leaves
//! - encoding: canonical values to native document / column values
//! - hydrate: canonical values back to fresh live values
//! - diff: structural change sets between snapshots and live state

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod diff;
pub mod encoding;
pub mod extract;
pub mod hydrate;
pub mod property;

pub use codec::{
    BinaryCodec, CodecRegistry, DateCodec, DateTimeCodec, LeafCodec, UuidCodec,
    ESCAPED_OBJECT_TAG, TYPE_KEY, VALUE_KEY,
};
pub use diff::{diff, diff_entity, Change, ChangeOp, ChangeSet};
pub use encoding::{DocumentEncoding, Encoding, TextEncoding};
pub use extract::{extract, Extractor};
pub use hydrate::materialize;
pub use property::{check_property, extract_property, normalize};
