//! Backend-native field values, rows and selectors

use std::collections::BTreeMap;
use std::fmt;

use crate::doc_value::DocValue;

/// SQLite column value
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// NULL
    Null,
    /// INTEGER
    Integer(i64),
    /// REAL
    Real(f64),
    /// TEXT
    Text(String),
    /// BLOB
    Blob(Vec<u8>),
}

impl ColumnValue {
    /// Get as &str if this is TEXT
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ColumnValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Check if this is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnValue::Null => write!(f, "NULL"),
            ColumnValue::Integer(i) => write!(f, "{}", i),
            ColumnValue::Real(r) => write!(f, "{:?}", r),
            ColumnValue::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            ColumnValue::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
        }
    }
}

impl From<ColumnValue> for rusqlite::types::Value {
    fn from(v: ColumnValue) -> Self {
        match v {
            ColumnValue::Null => rusqlite::types::Value::Null,
            ColumnValue::Integer(i) => rusqlite::types::Value::Integer(i),
            ColumnValue::Real(r) => rusqlite::types::Value::Real(r),
            ColumnValue::Text(s) => rusqlite::types::Value::Text(s),
            ColumnValue::Blob(b) => rusqlite::types::Value::Blob(b),
        }
    }
}

impl From<rusqlite::types::Value> for ColumnValue {
    fn from(v: rusqlite::types::Value) -> Self {
        match v {
            rusqlite::types::Value::Null => ColumnValue::Null,
            rusqlite::types::Value::Integer(i) => ColumnValue::Integer(i),
            rusqlite::types::Value::Real(r) => ColumnValue::Real(r),
            rusqlite::types::Value::Text(s) => ColumnValue::Text(s),
            rusqlite::types::Value::Blob(b) => ColumnValue::Blob(b),
        }
    }
}

/// A field value in whichever representation the backend speaks
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    /// Document store value
    Document(DocValue),
    /// Relational store column
    Column(ColumnValue),
}

impl NativeValue {
    /// True for document null or column NULL
    pub fn is_null(&self) -> bool {
        match self {
            NativeValue::Document(v) => v.is_null(),
            NativeValue::Column(v) => v.is_null(),
        }
    }
}

impl fmt::Display for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeValue::Document(v) => write!(f, "{}", v),
            NativeValue::Column(v) => write!(f, "{}", v),
        }
    }
}

impl From<DocValue> for NativeValue {
    fn from(v: DocValue) -> Self {
        NativeValue::Document(v)
    }
}

impl From<ColumnValue> for NativeValue {
    fn from(v: ColumnValue) -> Self {
        NativeValue::Column(v)
    }
}

/// A row as read back from a backend
///
/// Absent or null fields are omitted from `fields`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    /// Primary key
    pub id: String,
    /// Stored version, for collections with optimistic locking
    pub version: Option<u64>,
    /// Field values by name
    pub fields: BTreeMap<String, NativeValue>,
}

/// Equality conditions on top-level fields, combined with AND
///
/// The field name `id` addresses the primary key. A null condition value
/// matches rows where the field is absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    /// `(field, value)` pairs
    pub conditions: Vec<(String, NativeValue)>,
}

impl Selector {
    /// Selector matching every row
    pub fn all() -> Self {
        Selector::default()
    }

    /// Add an equality condition
    pub fn and_eq(mut self, field: impl Into<String>, value: impl Into<NativeValue>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return write!(f, "{{}}");
        }
        write!(f, "{{")?;
        for (i, (field, value)) in self.conditions.iter().enumerate() {
            if i > 0 {
                write!(f, " AND ")?;
            }
            write!(f, "{} = {}", field, value)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_value_sqlite_conversion() {
        let v = ColumnValue::Text("x".to_string());
        let sql: rusqlite::types::Value = v.clone().into();
        assert_eq!(ColumnValue::from(sql), v);
    }

    #[test]
    fn test_selector_display() {
        let sel = Selector::all()
            .and_eq("id", ColumnValue::Text("u1".into()))
            .and_eq("age", ColumnValue::Integer(3));
        assert_eq!(sel.to_string(), "{id = 'u1' AND age = 3}");
        assert_eq!(Selector::all().to_string(), "{}");
    }

    #[test]
    fn test_native_null() {
        assert!(NativeValue::from(DocValue::Null).is_null());
        assert!(NativeValue::from(ColumnValue::Null).is_null());
        assert!(!NativeValue::from(ColumnValue::Integer(0)).is_null());
    }
}
