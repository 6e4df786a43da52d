//! Hydration: canonical values back to live values

use strata_core::{Array, CanonicalValue, Object, Value};

/// Build a live value from a canonical value
///
/// Every object and array is freshly allocated and objects get no
/// prototype, so a hydrated value carries exactly the stored fields.
pub fn materialize(value: &CanonicalValue) -> Value {
    match value {
        CanonicalValue::Null => Value::Null,
        CanonicalValue::Bool(b) => Value::Bool(*b),
        CanonicalValue::Int(i) => Value::Int(*i),
        CanonicalValue::Float(f) => Value::Float(*f),
        CanonicalValue::String(s) => Value::String(s.clone()),
        CanonicalValue::Typed(leaf) => Value::Leaf(leaf.clone()),
        CanonicalValue::Array(items) => {
            Value::Array(Array::from_vec(items.iter().map(materialize).collect()))
        }
        CanonicalValue::Object(map) => {
            let object = Object::new();
            for (key, child) in map {
                object.set(key.clone(), materialize(child));
            }
            Value::Object(object)
        }
    }
}
