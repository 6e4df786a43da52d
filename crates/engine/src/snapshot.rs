//! Entity snapshots
//!
//! A snapshot is the canonical form of an entity as last seen in storage:
//! taken on load and replaced after every successful flush. The next flush
//! diffs live state against it.

use std::collections::BTreeMap;

use strata_core::{CanonicalValue, EntityMetadata, Result, Value};
use strata_mapping::{diff_entity, extract_property, ChangeSet, Extractor};

/// Canonical per-property state of one entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntitySnapshot {
    properties: BTreeMap<String, CanonicalValue>,
    version: Option<u64>,
}

impl EntitySnapshot {
    /// Create a snapshot
    pub fn new(properties: BTreeMap<String, CanonicalValue>, version: Option<u64>) -> Self {
        EntitySnapshot { properties, version }
    }

    /// Present properties
    pub fn properties(&self) -> &BTreeMap<String, CanonicalValue> {
        &self.properties
    }

    /// One property
    pub fn get(&self, name: &str) -> Option<&CanonicalValue> {
        self.properties.get(name)
    }

    /// Stored version
    pub fn version(&self) -> Option<u64> {
        self.version
    }

    /// Changes that turn this snapshot into `live`
    pub fn diff(&self, live: &BTreeMap<String, CanonicalValue>) -> ChangeSet {
        diff_entity(&self.properties, live)
    }
}

/// Canonical form of every declared property of a live entity
///
/// Absent and null properties are left out. Undeclared keys in `live` are
/// ignored; entity handles never hold any.
pub fn capture(
    meta: &EntityMetadata,
    live: &BTreeMap<String, Value>,
    extractor: &Extractor<'_>,
) -> Result<BTreeMap<String, CanonicalValue>> {
    let mut out = BTreeMap::new();
    for prop in &meta.properties {
        let value = live.get(&prop.name).unwrap_or(&Value::Null);
        if let Some(canonical) = extract_property(extractor, prop, value)? {
            out.insert(prop.name.clone(), canonical);
        }
    }
    Ok(out)
}
