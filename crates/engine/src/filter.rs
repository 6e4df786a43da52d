//! Query filters
//!
//! Equality on the primary key and on scalar properties, combined with AND.
//! JSON properties cannot be filtered on: their stored forms differ per
//! backend (nested document vs. JSON text).

use std::fmt;

use strata_core::{
    CanonicalValue, EntityId, EntityMetadata, Error, Result, TypedLeaf, PRIMARY_KEY,
};
use strata_mapping::{check_property, Encoding};
use strata_storage::Selector;

/// Equality conditions, combined with AND
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, CanonicalValue)>,
}

impl Filter {
    /// Filter matching every entity
    pub fn all() -> Self {
        Filter::default()
    }

    /// Match the primary key
    pub fn id(id: impl Into<EntityId>) -> Self {
        Filter::all().and_id(id)
    }

    /// Match a property value; `CanonicalValue::Null` matches unset properties
    pub fn eq(property: impl Into<String>, value: impl Into<CanonicalValue>) -> Self {
        Filter::all().and_eq(property, value)
    }

    /// Add a primary-key condition
    pub fn and_id(mut self, id: impl Into<EntityId>) -> Self {
        self.conditions.push((
            PRIMARY_KEY.to_string(),
            CanonicalValue::String(id.into().into_string()),
        ));
        self
    }

    /// Add a property condition
    pub fn and_eq(mut self, property: impl Into<String>, value: impl Into<CanonicalValue>) -> Self {
        self.conditions.push((property.into(), value.into()));
        self
    }

    /// Combine with another filter
    pub fn and(mut self, other: Filter) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    /// True if the filter has no conditions
    pub fn is_all(&self) -> bool {
        self.conditions.is_empty()
    }

    /// The key, if the filter is exactly one primary-key condition
    pub fn as_id(&self) -> Option<EntityId> {
        match self.conditions.as_slice() {
            [(field, CanonicalValue::String(id))] if field == PRIMARY_KEY => Some(EntityId::new(id.clone())),
            _ => None,
        }
    }

    /// Translate into a backend selector
    ///
    /// # Errors
    ///
    /// `InvalidInput` for unknown properties, JSON properties and values of
    /// the wrong type.
    pub fn to_selector(&self, meta: &EntityMetadata, encoding: &dyn Encoding) -> Result<Selector> {
        let mut selector = Selector::all();
        for (field, value) in &self.conditions {
            if field == PRIMARY_KEY {
                let CanonicalValue::String(id) = value else {
                    return Err(Error::invalid_input(format!(
                        "primary key filter expects a string, got {}",
                        value.type_name().to_lowercase()
                    )));
                };
                selector = selector.and_eq(field.clone(), encoding.encode_id(&EntityId::new(id.clone())));
                continue;
            }

            let prop = meta.require_property(field)?;
            if prop.kind.is_json() {
                return Err(Error::invalid_input(format!(
                    "cannot filter on JSON property '{}'",
                    field
                )));
            }
            if !value.is_null() {
                check_property(prop, value)?;
            }
            selector = selector.and_eq(field.clone(), encoding.encode_property(prop, value)?);
        }
        Ok(selector)
    }
}

fn render(value: &CanonicalValue) -> String {
    match value {
        CanonicalValue::Null => "null".to_string(),
        CanonicalValue::Bool(b) => b.to_string(),
        CanonicalValue::Int(i) => i.to_string(),
        CanonicalValue::Float(f) => f.to_string(),
        CanonicalValue::String(s) => format!("{:?}", s),
        CanonicalValue::Typed(TypedLeaf::DateTime(dt)) => dt.to_rfc3339(),
        CanonicalValue::Typed(TypedLeaf::Uuid(u)) => u.to_string(),
        other => format!("{:?}", other),
    }
}

/// Renders as `{email = "a@x" AND age = 3}`
impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (field, value)) in self.conditions.iter().enumerate() {
            if i > 0 {
                write!(f, " AND ")?;
            }
            write!(f, "{} = {}", field, render(value))?;
        }
        write!(f, "}}")
    }
}

/// Options for find operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Re-hydrate entities that are already managed, discarding unflushed
    /// changes to them
    pub refresh: bool,
    /// Maximum number of rows to fetch
    pub limit: Option<usize>,
}

impl FindOptions {
    /// Options with `refresh` set
    pub fn refresh() -> Self {
        FindOptions {
            refresh: true,
            limit: None,
        }
    }

    /// Cap the number of rows
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
