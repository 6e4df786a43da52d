//! Typed leaves
//!
//! Domain values that JSON cannot carry natively. A typed leaf is stored
//! either in a backend-native form (document store datetime/binary) or in
//! the generic tagged form produced by the codec registry.
//!
//! Equality is domain equality: two datetimes are equal when they denote
//! the same instant, regardless of the offset they were written with.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A non-JSON-native domain value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypedLeaf {
    /// Instant in time
    DateTime(DateTime<Utc>),
    /// Calendar date without time zone
    Date(NaiveDate),
    /// UUID
    Uuid(Uuid),
    /// Raw bytes
    Binary(Vec<u8>),
}

/// Discriminant of a [`TypedLeaf`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafKind {
    /// [`TypedLeaf::DateTime`]
    DateTime,
    /// [`TypedLeaf::Date`]
    Date,
    /// [`TypedLeaf::Uuid`]
    Uuid,
    /// [`TypedLeaf::Binary`]
    Binary,
}

impl LeafKind {
    /// Lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            LeafKind::DateTime => "datetime",
            LeafKind::Date => "date",
            LeafKind::Uuid => "uuid",
            LeafKind::Binary => "binary",
        }
    }
}

impl fmt::Display for LeafKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TypedLeaf {
    /// Kind of this leaf
    pub fn kind(&self) -> LeafKind {
        match self {
            TypedLeaf::DateTime(_) => LeafKind::DateTime,
            TypedLeaf::Date(_) => LeafKind::Date,
            TypedLeaf::Uuid(_) => LeafKind::Uuid,
            TypedLeaf::Binary(_) => LeafKind::Binary,
        }
    }

    /// Get the datetime if this is a DateTime leaf
    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            TypedLeaf::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    /// Get the date if this is a Date leaf
    pub fn as_date(&self) -> Option<&NaiveDate> {
        match self {
            TypedLeaf::Date(d) => Some(d),
            _ => None,
        }
    }

    /// Get the uuid if this is a Uuid leaf
    pub fn as_uuid(&self) -> Option<&Uuid> {
        match self {
            TypedLeaf::Uuid(u) => Some(u),
            _ => None,
        }
    }

    /// Get the bytes if this is a Binary leaf
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            TypedLeaf::Binary(b) => Some(b),
            _ => None,
        }
    }
}

impl From<DateTime<Utc>> for TypedLeaf {
    fn from(v: DateTime<Utc>) -> Self {
        TypedLeaf::DateTime(v)
    }
}

impl From<NaiveDate> for TypedLeaf {
    fn from(v: NaiveDate) -> Self {
        TypedLeaf::Date(v)
    }
}

impl From<Uuid> for TypedLeaf {
    fn from(v: Uuid) -> Self {
        TypedLeaf::Uuid(v)
    }
}
