//! Canonical value model
//!
//! `CanonicalValue` is the storage-agnostic tree every property value is
//! reduced to before it reaches a backend, and the form hydration produces
//! before a live value is rebuilt.
//!
//! ## Rules
//!
//! - Eight variants: Null, Bool, Int, Float, String, Typed, Array, Object
//! - No implicit coercions: `Int(1) != Float(1.0)`
//! - Object key order is irrelevant (keys are kept sorted)
//! - Typed leaves compare by domain equality
//! - A canonical value never carries prototype data; it only ever holds
//!   what the extractor found in own enumerable fields

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::leaf::TypedLeaf;
use crate::path::{JsonPath, PathSegment};

/// Storage-agnostic property value
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalValue {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point (always finite)
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Non-JSON-native domain value
    Typed(TypedLeaf),
    /// Ordered sequence
    Array(Vec<CanonicalValue>),
    /// Map with string keys
    Object(BTreeMap<String, CanonicalValue>),
}

impl CanonicalValue {
    /// Create an empty object
    pub fn object() -> Self {
        CanonicalValue::Object(BTreeMap::new())
    }

    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            CanonicalValue::Null => "Null",
            CanonicalValue::Bool(_) => "Bool",
            CanonicalValue::Int(_) => "Int",
            CanonicalValue::Float(_) => "Float",
            CanonicalValue::String(_) => "String",
            CanonicalValue::Typed(_) => "Typed",
            CanonicalValue::Array(_) => "Array",
            CanonicalValue::Object(_) => "Object",
        }
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, CanonicalValue::Null)
    }

    /// Check if this is an array or object
    pub fn is_container(&self) -> bool {
        matches!(self, CanonicalValue::Array(_) | CanonicalValue::Object(_))
    }

    /// Get as bool if this is a Bool value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CanonicalValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 if this is an Int value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            CanonicalValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if this is a Float value
    pub fn as_float(&self) -> Option<f64> {
        match self {
            CanonicalValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as &str if this is a String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CanonicalValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the typed leaf if this is a Typed value
    pub fn as_typed(&self) -> Option<&TypedLeaf> {
        match self {
            CanonicalValue::Typed(t) => Some(t),
            _ => None,
        }
    }

    /// Get the datetime if this is a Typed datetime leaf
    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        self.as_typed().and_then(TypedLeaf::as_datetime)
    }

    /// Get as slice if this is an Array value
    pub fn as_array(&self) -> Option<&[CanonicalValue]> {
        match self {
            CanonicalValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get as map if this is an Object value
    pub fn as_object(&self) -> Option<&BTreeMap<String, CanonicalValue>> {
        match self {
            CanonicalValue::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Object member lookup
    pub fn get(&self, key: &str) -> Option<&CanonicalValue> {
        self.as_object().and_then(|o| o.get(key))
    }

    /// Value at `path`, or None when the path does not resolve
    pub fn get_path(&self, path: &JsonPath) -> Option<&CanonicalValue> {
        let mut current = self;
        for segment in path.segments() {
            current = match (segment, current) {
                (PathSegment::Key(key), CanonicalValue::Object(obj)) => obj.get(key)?,
                (PathSegment::Index(idx), CanonicalValue::Array(arr)) => arr.get(*idx)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Maximum container nesting depth (0 for scalars and leaves)
    pub fn nesting_depth(&self) -> usize {
        match self {
            CanonicalValue::Array(arr) => 1 + arr.iter().map(Self::nesting_depth).max().unwrap_or(0),
            CanonicalValue::Object(obj) => {
                1 + obj.values().map(Self::nesting_depth).max().unwrap_or(0)
            }
            _ => 0,
        }
    }
}

// ============================================================================
// From implementations for ergonomic API usage
// ============================================================================

impl From<&str> for CanonicalValue {
    fn from(s: &str) -> Self {
        CanonicalValue::String(s.to_string())
    }
}

impl From<String> for CanonicalValue {
    fn from(s: String) -> Self {
        CanonicalValue::String(s)
    }
}

impl From<i64> for CanonicalValue {
    fn from(i: i64) -> Self {
        CanonicalValue::Int(i)
    }
}

impl From<i32> for CanonicalValue {
    fn from(i: i32) -> Self {
        CanonicalValue::Int(i as i64)
    }
}

impl From<f64> for CanonicalValue {
    fn from(f: f64) -> Self {
        CanonicalValue::Float(f)
    }
}

impl From<bool> for CanonicalValue {
    fn from(b: bool) -> Self {
        CanonicalValue::Bool(b)
    }
}

impl From<TypedLeaf> for CanonicalValue {
    fn from(leaf: TypedLeaf) -> Self {
        CanonicalValue::Typed(leaf)
    }
}

impl From<DateTime<Utc>> for CanonicalValue {
    fn from(dt: DateTime<Utc>) -> Self {
        CanonicalValue::Typed(TypedLeaf::DateTime(dt))
    }
}

impl From<Vec<CanonicalValue>> for CanonicalValue {
    fn from(items: Vec<CanonicalValue>) -> Self {
        CanonicalValue::Array(items)
    }
}

impl From<BTreeMap<String, CanonicalValue>> for CanonicalValue {
    fn from(map: BTreeMap<String, CanonicalValue>) -> Self {
        CanonicalValue::Object(map)
    }
}

/// Plain structural conversion
///
/// No tag decoding happens here: a `{"$type": ..., "$value": ...}` object
/// stays an object. Use the codec registry to decode tagged forms.
impl From<serde_json::Value> for CanonicalValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => CanonicalValue::Null,
            serde_json::Value::Bool(b) => CanonicalValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => CanonicalValue::Int(i),
                None => CanonicalValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => CanonicalValue::String(s),
            serde_json::Value::Array(arr) => {
                CanonicalValue::Array(arr.into_iter().map(CanonicalValue::from).collect())
            }
            serde_json::Value::Object(obj) => CanonicalValue::Object(
                obj.into_iter()
                    .map(|(k, v)| (k, CanonicalValue::from(v)))
                    .collect(),
            ),
        }
    }
}
