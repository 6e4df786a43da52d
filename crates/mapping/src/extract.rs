//! Value extraction
//!
//! Reduces a live [`Value`] to the [`CanonicalValue`] that gets persisted.
//!
//! Only own enumerable fields of an object are part of its state. Fields
//! inherited through a prototype are invisible here at every nesting level,
//! as are own fields defined hidden. Whatever the application reads through
//! the prototype is its own business; it is never written.
//!
//! Rejected inputs:
//! - host values (`Value::Native`) and leaves with no registered codec
//! - NaN and infinite floats
//! - cycles (a container reachable from itself); shared acyclic
//!   sub-structures are fine and extracted at each occurrence
//! - nesting deeper than the configured limit

use strata_core::{CanonicalValue, Error, JsonPath, Limits, Result, Value};

use crate::codec::CodecRegistry;

/// Extracts persistable state from live values
#[derive(Debug, Clone, Copy)]
pub struct Extractor<'a> {
    codecs: &'a CodecRegistry,
    limits: Limits,
}

impl<'a> Extractor<'a> {
    /// Create an extractor
    pub fn new(codecs: &'a CodecRegistry, limits: Limits) -> Self {
        Extractor { codecs, limits }
    }

    /// Extract a value; error paths are relative to the value itself
    pub fn extract(&self, value: &Value) -> Result<CanonicalValue> {
        self.extract_at(value, &JsonPath::root())
    }

    /// Extract a value located at `base` (used in error paths)
    pub fn extract_at(&self, value: &Value, base: &JsonPath) -> Result<CanonicalValue> {
        let mut path = base.clone();
        let mut stack = Vec::new();
        self.walk(value, &mut path, &mut stack)
    }

    fn walk(&self, value: &Value, path: &mut JsonPath, stack: &mut Vec<usize>) -> Result<CanonicalValue> {
        match value {
            Value::Null => Ok(CanonicalValue::Null),
            Value::Bool(b) => Ok(CanonicalValue::Bool(*b)),
            Value::Int(i) => Ok(CanonicalValue::Int(*i)),
            Value::Float(f) if f.is_finite() => Ok(CanonicalValue::Float(*f)),
            Value::Float(f) => Err(Error::unsupported(path.clone(), format!("non-finite float {}", f))),
            Value::String(s) => Ok(CanonicalValue::String(s.clone())),
            Value::Leaf(leaf) if self.codecs.supports(leaf.kind()) => Ok(CanonicalValue::Typed(leaf.clone())),
            Value::Leaf(leaf) => Err(Error::unsupported(
                path.clone(),
                format!("unregistered {}", leaf.kind()),
            )),
            Value::Native(handle) => Err(Error::unsupported(
                path.clone(),
                format!("native {}", handle.type_name()),
            )),
            Value::Array(array) => {
                self.enter(array.addr(), path, stack)?;
                let mut items = Vec::with_capacity(array.len());
                for (i, item) in array.to_vec().iter().enumerate() {
                    path.push_index(i);
                    let extracted = self.walk(item, path, stack);
                    path.pop();
                    items.push(extracted?);
                }
                stack.pop();
                Ok(CanonicalValue::Array(items))
            }
            Value::Object(object) => {
                self.enter(object.addr(), path, stack)?;
                let mut map = std::collections::BTreeMap::new();
                for (key, child) in object.own_entries() {
                    path.push_key(key.clone());
                    let extracted = self.walk(&child, path, stack);
                    path.pop();
                    map.insert(key, extracted?);
                }
                stack.pop();
                Ok(CanonicalValue::Object(map))
            }
        }
    }

    /// Push a container onto the in-progress stack
    fn enter(&self, addr: usize, path: &JsonPath, stack: &mut Vec<usize>) -> Result<()> {
        if stack.contains(&addr) {
            return Err(Error::CyclicValue { path: path.clone() });
        }
        self.limits.check_depth(stack.len() + 1)?;
        path.validate(self.limits.max_path_length)?;
        stack.push(addr);
        Ok(())
    }
}

/// Extract with default limits
pub fn extract(value: &Value, codecs: &CodecRegistry) -> Result<CanonicalValue> {
    Extractor::new(codecs, Limits::default()).extract(value)
}
