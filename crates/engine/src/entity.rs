//! Managed entity handles
//!
//! An [`EntityRef`] is a shared handle to one entity's live state. The
//! session that loaded or created it keeps a clone in its identity map, so
//! every lookup of the same row within that session yields the same handle.
//! Property values are live [`Value`]s: mutating an `Object` obtained from
//! [`EntityRef::get`] mutates the entity.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use strata_core::{EntityId, EntityMetadata, Error, Result, Value};

struct EntityState {
    meta: Arc<EntityMetadata>,
    id: EntityId,
    properties: BTreeMap<String, Value>,
    version: Option<u64>,
}

/// Shared handle to a managed entity
#[derive(Clone)]
pub struct EntityRef {
    inner: Arc<RwLock<EntityState>>,
}

impl EntityRef {
    pub(crate) fn new(
        meta: Arc<EntityMetadata>,
        id: EntityId,
        properties: BTreeMap<String, Value>,
        version: Option<u64>,
    ) -> Self {
        EntityRef {
            inner: Arc::new(RwLock::new(EntityState {
                meta,
                id,
                properties,
                version,
            })),
        }
    }

    /// Entity name
    pub fn entity_name(&self) -> String {
        self.inner.read().meta.name.clone()
    }

    /// Entity declaration
    pub fn metadata(&self) -> Arc<EntityMetadata> {
        Arc::clone(&self.inner.read().meta)
    }

    /// Primary key
    pub fn id(&self) -> EntityId {
        self.inner.read().id.clone()
    }

    /// Current value of a property; `None` if unset
    ///
    /// Objects and arrays are returned as shared handles.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.read().properties.get(name).cloned()
    }

    /// Assign a property
    ///
    /// Assigning `Value::Null` clears the property.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let mut state = self.inner.write();
        state.meta.require_property(name)?;
        state.properties.insert(name.to_string(), value.into());
        Ok(())
    }

    /// Clear a property
    pub fn unset(&self, name: &str) -> Result<()> {
        let mut state = self.inner.write();
        state.meta.require_property(name)?;
        state.properties.remove(name);
        Ok(())
    }

    /// Stored version for versioned entities, `None` before the first flush
    pub fn version(&self) -> Option<u64> {
        self.inner.read().version
    }

    /// All assigned properties (shared handles)
    pub fn properties(&self) -> BTreeMap<String, Value> {
        self.inner.read().properties.clone()
    }

    /// True if both handles refer to the same managed entity
    pub fn ptr_eq(&self, other: &EntityRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn set_version(&self, version: Option<u64>) {
        self.inner.write().version = version;
    }

    /// Replace the live state with freshly hydrated values
    pub(crate) fn replace(&self, properties: BTreeMap<String, Value>, version: Option<u64>) {
        let mut state = self.inner.write();
        state.properties = properties;
        state.version = version;
    }

    pub(crate) fn check_entity(&self, name: &str) -> Result<()> {
        let state = self.inner.read();
        if state.meta.name == name {
            Ok(())
        } else {
            Err(Error::invalid_input(format!(
                "handle is a {}, not a {}",
                state.meta.name, name
            )))
        }
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.read();
        f.debug_struct("EntityRef")
            .field("entity", &state.meta.name)
            .field("id", &state.id)
            .field("version", &state.version)
            .field("properties", &state.properties.keys().collect::<Vec<_>>())
            .finish()
    }
}
