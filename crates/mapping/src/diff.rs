//! Change sets
//!
//! A [`ChangeSet`] is the ordered list of leaf-level differences between a
//! snapshot and the live state. Diffing is purely structural: two distinct
//! objects with equal contents produce no change, and object identity is
//! never consulted.
//!
//! Rules, applied recursively:
//! - objects: keys in sorted order; added or changed keys are `Set`,
//!   removed keys are `Unset`
//! - arrays of equal length: element by element
//! - arrays whose length changed: the whole array is `Set`
//! - a change of kind (object to string, datetime to array, ...): `Set`
//! - objects carrying a `$type` key are treated as single values, so a
//!   tagged form is never rewritten piecemeal

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use strata_core::{CanonicalValue, JsonPath};

use crate::codec::TYPE_KEY;

/// What happens at a path
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeOp {
    /// Write this value
    Set(CanonicalValue),
    /// Remove the value
    Unset,
}

/// One difference
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Location, starting with the property name for entity-level diffs
    pub path: JsonPath,
    /// Operation
    pub op: ChangeOp,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            ChangeOp::Set(value) => write!(f, "set {} = {:?}", self.path, value),
            ChangeOp::Unset => write!(f, "unset {}", self.path),
        }
    }
}

/// Ordered list of changes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    /// Create an empty change set
    pub fn new() -> Self {
        ChangeSet::default()
    }

    /// True if nothing changed
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of changes
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Iterate the changes in order
    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.changes.iter()
    }

    /// Append a `Set`
    pub fn set(&mut self, path: JsonPath, value: CanonicalValue) {
        self.changes.push(Change {
            path,
            op: ChangeOp::Set(value),
        });
    }

    /// Append an `Unset`
    pub fn unset(&mut self, path: JsonPath) {
        self.changes.push(Change {
            path,
            op: ChangeOp::Unset,
        });
    }

    /// Append all changes of another set
    pub fn extend(&mut self, other: ChangeSet) {
        self.changes.extend(other.changes);
    }

    /// Top-level property names touched by the changes, sorted
    pub fn touched_properties(&self) -> Vec<String> {
        self.changes
            .iter()
            .filter_map(|c| c.path.property_name().map(str::to_string))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

/// Structural diff of two values located at `path`
pub fn diff(path: &JsonPath, snapshot: &CanonicalValue, live: &CanonicalValue) -> ChangeSet {
    let mut out = ChangeSet::new();
    let mut path = path.clone();
    diff_into(&mut path, snapshot, live, &mut out);
    out
}

fn is_atomic(map: &BTreeMap<String, CanonicalValue>) -> bool {
    map.contains_key(TYPE_KEY)
}

fn diff_into(path: &mut JsonPath, old: &CanonicalValue, new: &CanonicalValue, out: &mut ChangeSet) {
    if old == new {
        return;
    }
    match (old, new) {
        (CanonicalValue::Object(a), CanonicalValue::Object(b)) if !is_atomic(a) && !is_atomic(b) => {
            let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            for key in keys {
                path.push_key(key.clone());
                match (a.get(key), b.get(key)) {
                    (Some(x), Some(y)) => diff_into(path, x, y, out),
                    (None, Some(y)) => out.set(path.clone(), y.clone()),
                    (Some(_), None) => out.unset(path.clone()),
                    (None, None) => {}
                }
                path.pop();
            }
        }
        (CanonicalValue::Array(a), CanonicalValue::Array(b)) if a.len() == b.len() => {
            for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
                path.push_index(i);
                diff_into(path, x, y, out);
                path.pop();
            }
        }
        _ => out.set(path.clone(), new.clone()),
    }
}

/// Diff two per-property maps; absent properties are unset
pub fn diff_entity(
    snapshot: &BTreeMap<String, CanonicalValue>,
    live: &BTreeMap<String, CanonicalValue>,
) -> ChangeSet {
    let mut out = ChangeSet::new();
    let names: BTreeSet<&String> = snapshot.keys().chain(live.keys()).collect();
    for name in names {
        let path = JsonPath::property(name.clone());
        match (snapshot.get(name), live.get(name)) {
            (Some(old), Some(new)) => out.extend(diff(&path, old, new)),
            (None, Some(new)) => out.set(path, new.clone()),
            (Some(_), None) => out.unset(path),
            (None, None) => {}
        }
    }
    out
}
