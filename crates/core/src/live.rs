//! Live value model
//!
//! The in-memory values application code binds to entity properties.
//!
//! - [`Object`] is a shared handle to a map of own fields plus an optional
//!   prototype object. Reads through [`Object::get`] fall back to the
//!   prototype chain; persistence only ever looks at own enumerable fields.
//! - [`Array`] is a shared handle to an ordered list.
//! - Scalars and typed leaves are plain values.
//! - [`NativeHandle`] wraps host values (callbacks, sockets, ...) that have
//!   no persistable form.
//!
//! Objects and arrays are reference types: cloning a [`Value`] clones the
//! handle, not the contents, so structures may share sub-objects or even
//! contain cycles. The extractor rejects cycles.
//!
//! A prototype is fixed when the object is created, so prototype chains
//! are always acyclic.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::leaf::TypedLeaf;

/// A value bound to an entity property
#[derive(Clone, Debug)]
pub enum Value {
    /// Null
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Non-JSON-native domain value
    Leaf(TypedLeaf),
    /// Shared list
    Array(Array),
    /// Shared object with optional prototype
    Object(Object),
    /// Host value with no persistable form
    Native(NativeHandle),
}

impl Value {
    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Leaf(_) => "leaf",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Native(_) => "native",
        }
    }

    /// Check if this is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get as &str if this is a String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as i64 if this is an Int value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the leaf if this is a Leaf value
    pub fn as_leaf(&self) -> Option<&TypedLeaf> {
        match self {
            Value::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    /// Get the datetime if this is a datetime leaf
    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        self.as_leaf().and_then(TypedLeaf::as_datetime)
    }

    /// Get the object handle if this is an Object value
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Get the array handle if this is an Array value
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }
}

// ============================================================================
// Object
// ============================================================================

#[derive(Default)]
struct Slot {
    value: Option<Value>,
    enumerable: bool,
}

#[derive(Default)]
struct ObjectData {
    own: BTreeMap<String, Slot>,
    prototype: Option<Object>,
}

/// Shared object handle
///
/// ```
/// use strata_core::{Object, Value};
///
/// let defaults = Object::new();
/// defaults.set("mouse", "no-brand");
///
/// let devices = Object::with_prototype(&defaults);
/// devices.set("keyboard", "acme");
///
/// // reads see the prototype...
/// assert_eq!(devices.get("mouse").unwrap().as_str(), Some("no-brand"));
/// // ...own fields do not
/// assert_eq!(devices.own_keys(), vec!["keyboard".to_string()]);
/// ```
#[derive(Clone, Default)]
pub struct Object {
    inner: Arc<RwLock<ObjectData>>,
}

impl Object {
    /// Create an empty object with no prototype
    pub fn new() -> Self {
        Object::default()
    }

    /// Create an empty object whose reads fall back to `prototype`
    pub fn with_prototype(prototype: &Object) -> Self {
        Object {
            inner: Arc::new(RwLock::new(ObjectData {
                own: BTreeMap::new(),
                prototype: Some(prototype.clone()),
            })),
        }
    }

    /// Create an object from own enumerable entries
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let object = Object::new();
        for (k, v) in entries {
            object.set(k, v);
        }
        object
    }

    /// The prototype object, if any
    pub fn prototype(&self) -> Option<Object> {
        self.inner.read().prototype.clone()
    }

    /// Set an own enumerable field
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.write().own.insert(
            key.into(),
            Slot {
                value: Some(value.into()),
                enumerable: true,
            },
        );
    }

    /// Set an own field that is not enumerable (never persisted)
    pub fn define_hidden(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.write().own.insert(
            key.into(),
            Slot {
                value: Some(value.into()),
                enumerable: false,
            },
        );
    }

    /// Remove an own field, returning its value
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.write().own.remove(key).and_then(|slot| slot.value)
    }

    /// Read a field, falling back to the prototype chain
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut current = self.clone();
        loop {
            let next = {
                let data = current.inner.read();
                if let Some(slot) = data.own.get(key) {
                    return slot.value.clone();
                }
                data.prototype.clone()
            };
            current = next?;
        }
    }

    /// Read an own field (enumerable or not), ignoring the prototype
    pub fn get_own(&self, key: &str) -> Option<Value> {
        self.inner.read().own.get(key).and_then(|slot| slot.value.clone())
    }

    /// True if `key` is an own field
    pub fn has_own(&self, key: &str) -> bool {
        self.inner.read().own.contains_key(key)
    }

    /// True if `key` resolves on this object or its prototype chain
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Own enumerable keys, sorted
    pub fn own_keys(&self) -> Vec<String> {
        self.inner
            .read()
            .own
            .iter()
            .filter(|(_, slot)| slot.enumerable)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Own enumerable entries, sorted by key
    ///
    /// Values are cloned handles; the lock is released before returning.
    pub fn own_entries(&self) -> Vec<(String, Value)> {
        self.inner
            .read()
            .own
            .iter()
            .filter(|(_, slot)| slot.enumerable)
            .filter_map(|(k, slot)| slot.value.clone().map(|v| (k.clone(), v)))
            .collect()
    }

    /// Number of own enumerable fields
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .own
            .values()
            .filter(|slot| slot.enumerable)
            .count()
    }

    /// True if there are no own enumerable fields
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if both handles point at the same object
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stable address of the shared object, for identity tracking
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

impl fmt::Debug for Object {
    // Shallow on purpose: objects may be cyclic.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.inner.read();
        f.debug_struct("Object")
            .field("own_keys", &data.own.keys().collect::<Vec<_>>())
            .field("has_prototype", &data.prototype.is_some())
            .finish()
    }
}

// ============================================================================
// Array
// ============================================================================

/// Shared list handle
#[derive(Clone, Default)]
pub struct Array {
    inner: Arc<RwLock<Vec<Value>>>,
}

impl Array {
    /// Create an empty array
    pub fn new() -> Self {
        Array::default()
    }

    /// Create an array from values
    pub fn from_vec(items: Vec<Value>) -> Self {
        Array {
            inner: Arc::new(RwLock::new(items)),
        }
    }

    /// Append a value
    pub fn push(&self, value: impl Into<Value>) {
        self.inner.write().push(value.into());
    }

    /// Element at `index`
    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.read().get(index).cloned()
    }

    /// Replace the element at `index`; returns false when out of bounds
    pub fn set(&self, index: usize, value: impl Into<Value>) -> bool {
        match self.inner.write().get_mut(index) {
            Some(slot) => {
                *slot = value.into();
                true
            }
            None => false,
        }
    }

    /// Remove and return the last element
    pub fn pop(&self) -> Option<Value> {
        self.inner.write().pop()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// True if there are no elements
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Snapshot of the element handles
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.read().clone()
    }

    /// True if both handles point at the same array
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stable address of the shared array, for identity tracking
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Array(len={})", self.len())
    }
}

// ============================================================================
// NativeHandle
// ============================================================================

/// Opaque host value
#[derive(Clone)]
pub struct NativeHandle {
    type_name: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl NativeHandle {
    /// Wrap a host value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        NativeHandle {
            type_name: std::any::type_name::<T>(),
            inner: Arc::new(value),
        }
    }

    /// Rust type name of the wrapped value
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Borrow the wrapped value as `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeHandle({})", self.type_name)
    }
}

// ============================================================================
// From implementations
// ============================================================================

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<TypedLeaf> for Value {
    fn from(leaf: TypedLeaf) -> Self {
        Value::Leaf(leaf)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::Leaf(TypedLeaf::DateTime(dt))
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Leaf(TypedLeaf::Date(d))
    }
}

impl From<Uuid> for Value {
    fn from(u: Uuid) -> Self {
        Value::Leaf(TypedLeaf::Uuid(u))
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Array::from_vec(items))
    }
}

impl From<NativeHandle> for Value {
    fn from(h: NativeHandle) -> Self {
        Value::Native(h)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// Builds fresh objects and arrays with no prototypes
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => {
                Value::Array(Array::from_vec(arr.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(obj) => Value::Object(Object::from_entries(
                obj.into_iter().map(|(k, v)| (k, Value::from(v))),
            )),
        }
    }
}
