//! Document store values
//!
//! `DocValue` is the native value model of the document store: nested
//! documents and arrays plus native datetime and binary types. Path updates
//! follow `$set` / `$unset` semantics:
//!
//! - `set_path` creates missing intermediate documents, overwrites the
//!   target, and extends arrays (padding with nulls) when the index is past
//!   the end.
//! - `unset_path` removes a document key; unsetting an array element leaves
//!   a null in its place; unsetting a missing path is a no-op.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use strata_core::{JsonPath, PathSegment};

use crate::error::{StorageError, StorageResult};

/// Native document store value
#[derive(Debug, Clone, PartialEq)]
pub enum DocValue {
    /// Null
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Native datetime (UTC)
    DateTime(DateTime<Utc>),
    /// Native binary
    Binary(Vec<u8>),
    /// Ordered array
    Array(Vec<DocValue>),
    /// Nested document
    Document(BTreeMap<String, DocValue>),
}

impl DocValue {
    /// Create an empty document
    pub fn document() -> Self {
        DocValue::Document(BTreeMap::new())
    }

    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            DocValue::Null => "null",
            DocValue::Bool(_) => "bool",
            DocValue::Int(_) => "int",
            DocValue::Double(_) => "double",
            DocValue::String(_) => "string",
            DocValue::DateTime(_) => "date",
            DocValue::Binary(_) => "binData",
            DocValue::Array(_) => "array",
            DocValue::Document(_) => "object",
        }
    }

    /// Value at `path`, or None when the path does not resolve
    pub fn get_path(&self, path: &JsonPath) -> Option<&DocValue> {
        let mut current = self;
        for segment in path.segments() {
            current = match (segment, current) {
                (PathSegment::Key(key), DocValue::Document(doc)) => doc.get(key)?,
                (PathSegment::Index(idx), DocValue::Array(arr)) => arr.get(*idx)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Set the value at `path`
    pub fn set_path(&mut self, path: &JsonPath, value: DocValue) -> StorageResult<()> {
        let segments = path.segments();
        if segments.is_empty() {
            *self = value;
            return Ok(());
        }

        let mut current = self;
        for (i, segment) in segments.iter().enumerate() {
            let last = i + 1 == segments.len();
            current = match (segment, current) {
                (PathSegment::Key(key), DocValue::Document(doc)) => {
                    if last {
                        doc.insert(key.clone(), value);
                        return Ok(());
                    }
                    doc.entry(key.clone()).or_insert_with(DocValue::document)
                }
                (PathSegment::Index(idx), DocValue::Array(arr)) => {
                    while arr.len() <= *idx {
                        arr.push(DocValue::Null);
                    }
                    if last {
                        arr[*idx] = value;
                        return Ok(());
                    }
                    if arr[*idx].is_null() {
                        arr[*idx] = DocValue::document();
                    }
                    &mut arr[*idx]
                }
                (segment, other) => {
                    return Err(StorageError::InvalidPath {
                        path: path.to_string(),
                        reason: format!("cannot traverse {} with '{}'", other.type_name(), segment),
                    })
                }
            };
        }
        Ok(())
    }

    /// Remove the value at `path`
    pub fn unset_path(&mut self, path: &JsonPath) -> StorageResult<()> {
        let Some((last, parents)) = path.segments().split_last() else {
            return Err(StorageError::InvalidPath {
                path: path.to_string(),
                reason: "cannot unset the root".to_string(),
            });
        };

        let mut current = self;
        for segment in parents {
            current = match (segment, current) {
                (PathSegment::Key(key), DocValue::Document(doc)) => match doc.get_mut(key) {
                    Some(child) => child,
                    None => return Ok(()),
                },
                (PathSegment::Index(idx), DocValue::Array(arr)) => match arr.get_mut(*idx) {
                    Some(child) => child,
                    None => return Ok(()),
                },
                _ => return Ok(()),
            };
        }

        match (last, current) {
            (PathSegment::Key(key), DocValue::Document(doc)) => {
                doc.remove(key);
            }
            (PathSegment::Index(idx), DocValue::Array(arr)) => {
                if let Some(slot) = arr.get_mut(*idx) {
                    *slot = DocValue::Null;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Check if this is null
    pub fn is_null(&self) -> bool {
        matches!(self, DocValue::Null)
    }

    /// Get as map if this is a document
    pub fn as_document(&self) -> Option<&BTreeMap<String, DocValue>> {
        match self {
            DocValue::Document(doc) => Some(doc),
            _ => None,
        }
    }

    /// Key used by unique indexes; None for values that are never indexed
    pub(crate) fn index_key(&self) -> Option<String> {
        match self {
            DocValue::Null => None,
            DocValue::Bool(b) => Some(format!("b:{}", b)),
            DocValue::Int(i) => Some(format!("i:{}", i)),
            DocValue::Double(f) => Some(format!("f:{}", f.to_bits())),
            DocValue::String(s) => Some(format!("s:{}", s)),
            DocValue::DateTime(dt) => Some(format!("d:{}", dt.timestamp_nanos_opt().unwrap_or(i64::MAX))),
            DocValue::Binary(b) => Some(format!("x:{:?}", b)),
            DocValue::Array(_) | DocValue::Document(_) => Some(format!("j:{}", self)),
        }
    }
}

impl fmt::Display for DocValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocValue::Null => write!(f, "null"),
            DocValue::Bool(b) => write!(f, "{}", b),
            DocValue::Int(i) => write!(f, "{}", i),
            DocValue::Double(d) => write!(f, "{:?}", d),
            DocValue::String(s) => write!(f, "{:?}", s),
            DocValue::DateTime(dt) => {
                write!(f, "ISODate({:?})", dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            DocValue::Binary(b) => write!(f, "BinData({} bytes)", b.len()),
            DocValue::Array(arr) => {
                write!(f, "[")?;
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            DocValue::Document(doc) => {
                write!(f, "{{")?;
                for (i, (k, v)) in doc.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}
