//! Entity metadata
//!
//! Declares which entities exist, which properties they have, and how each
//! property is stored:
//!
//! - `Scalar` properties map to a single typed field or column.
//! - `Json` properties hold an arbitrary nested value. An optional
//!   [`JsonHint`] names paths inside the value that are known to hold typed
//!   leaves, so plain strings at those paths can be read back as the right
//!   type even when the tagged form was lost.
//!
//! Every entity has an implicit string primary key named [`PRIMARY_KEY`].
//! Metadata is immutable once the registry is built.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::leaf::LeafKind;
use crate::path::{PathParseError, PathPattern, PathSegment};

/// Name of the implicit primary key property
pub const PRIMARY_KEY: &str = "id";

/// Storage type of a scalar property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    /// UTF-8 string
    String,
    /// 64-bit signed integer
    Int,
    /// 64-bit float
    Float,
    /// Boolean
    Bool,
    /// Instant in time
    DateTime,
    /// UUID
    Uuid,
}

impl ScalarType {
    /// Lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::String => "string",
            ScalarType::Int => "int",
            ScalarType::Float => "float",
            ScalarType::Bool => "bool",
            ScalarType::DateTime => "datetime",
            ScalarType::Uuid => "uuid",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed-leaf locations inside a JSON property
///
/// Patterns are relative to the property value; the empty pattern means
/// the property value itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonHint {
    typed_paths: Vec<(PathPattern, LeafKind)>,
}

impl JsonHint {
    /// Create an empty hint
    pub fn new() -> Self {
        JsonHint::default()
    }

    /// Declare that values matching `pattern` are leaves of `kind`
    pub fn try_typed(mut self, pattern: &str, kind: LeafKind) -> std::result::Result<Self, PathParseError> {
        self.typed_paths.push((pattern.parse()?, kind));
        Ok(self)
    }

    /// Declare a datetime path
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid path pattern. Use
    /// [`JsonHint::try_typed`] for patterns that are not literals.
    pub fn datetime(self, pattern: &str) -> Self {
        self.literal(pattern, LeafKind::DateTime)
    }

    /// Declare a date path
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid path pattern.
    pub fn date(self, pattern: &str) -> Self {
        self.literal(pattern, LeafKind::Date)
    }

    /// Declare a uuid path
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid path pattern.
    pub fn uuid(self, pattern: &str) -> Self {
        self.literal(pattern, LeafKind::Uuid)
    }

    /// Declare a binary path
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid path pattern.
    pub fn binary(self, pattern: &str) -> Self {
        self.literal(pattern, LeafKind::Binary)
    }

    fn literal(self, pattern: &str, kind: LeafKind) -> Self {
        match self.try_typed(pattern, kind) {
            Ok(hint) => hint,
            Err(e) => panic!("invalid hint pattern '{}': {}", pattern, e),
        }
    }

    /// Leaf kind expected at `path` (relative to the property value)
    pub fn expected_kind(&self, path: &[PathSegment]) -> Option<LeafKind> {
        self.typed_paths
            .iter()
            .find(|(pattern, _)| pattern.matches(path))
            .map(|(_, kind)| *kind)
    }

    /// True if no typed paths are declared
    pub fn is_empty(&self) -> bool {
        self.typed_paths.is_empty()
    }
}

/// How a property is stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    /// Single typed field or column
    Scalar(ScalarType),
    /// Arbitrary nested value
    Json(JsonHint),
}

impl PropertyKind {
    /// True for JSON properties
    pub fn is_json(&self) -> bool {
        matches!(self, PropertyKind::Json(_))
    }
}

/// A declared entity property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMetadata {
    /// Property name (also the stored field or column name)
    pub name: String,
    /// Storage kind
    pub kind: PropertyKind,
    /// Backend enforces uniqueness
    pub unique: bool,
    /// Absent values are allowed
    pub nullable: bool,
}

impl PropertyMetadata {
    /// Nullable, non-unique scalar property
    pub fn scalar(name: impl Into<String>, ty: ScalarType) -> Self {
        PropertyMetadata {
            name: name.into(),
            kind: PropertyKind::Scalar(ty),
            unique: false,
            nullable: true,
        }
    }

    /// JSON property without typed-leaf hints
    pub fn json(name: impl Into<String>) -> Self {
        Self::json_with_hint(name, JsonHint::new())
    }

    /// JSON property with typed-leaf hints
    pub fn json_with_hint(name: impl Into<String>, hint: JsonHint) -> Self {
        PropertyMetadata {
            name: name.into(),
            kind: PropertyKind::Json(hint),
            unique: false,
            nullable: true,
        }
    }

    /// Mark the property unique
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Mark the property required (not nullable)
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Scalar type, if this is a scalar property
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match &self.kind {
            PropertyKind::Scalar(ty) => Some(*ty),
            PropertyKind::Json(_) => None,
        }
    }

    /// Typed-leaf hint, if this is a JSON property
    pub fn json_hint(&self) -> Option<&JsonHint> {
        match &self.kind {
            PropertyKind::Json(hint) => Some(hint),
            PropertyKind::Scalar(_) => None,
        }
    }
}

/// A declared entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    /// Entity name
    pub name: String,
    /// Collection (document store) or table (relational store) name
    pub collection: String,
    /// Declared properties, in declaration order
    pub properties: Vec<PropertyMetadata>,
    /// Integer property used for optimistic locking, if any
    pub version_field: Option<String>,
}

impl EntityMetadata {
    /// Start declaring an entity; the collection defaults to the lowercased name
    pub fn builder(name: impl Into<String>) -> EntityMetadataBuilder {
        let name = name.into();
        EntityMetadataBuilder {
            collection: name.to_lowercase(),
            name,
            properties: Vec::new(),
            version_field: None,
        }
    }

    /// Look up a property
    pub fn property(&self, name: &str) -> Option<&PropertyMetadata> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Look up a property or fail with `InvalidInput`
    pub fn require_property(&self, name: &str) -> Result<&PropertyMetadata> {
        self.property(name).ok_or_else(|| {
            Error::invalid_input(format!("unknown property '{}' on {}", name, self.name))
        })
    }

    /// Properties declared unique
    pub fn unique_properties(&self) -> impl Iterator<Item = &PropertyMetadata> {
        self.properties.iter().filter(|p| p.unique)
    }

    /// True if optimistic locking is enabled
    pub fn is_versioned(&self) -> bool {
        self.version_field.is_some()
    }

    fn validate(&self) -> Result<()> {
        check_identifier(&self.name, "entity name")?;
        check_identifier(&self.collection, "collection name")?;

        let mut seen = std::collections::BTreeSet::new();
        for prop in &self.properties {
            check_identifier(&prop.name, "property name")?;
            if prop.name == PRIMARY_KEY {
                return Err(Error::invalid_input(format!(
                    "{}: '{}' is reserved for the primary key",
                    self.name, PRIMARY_KEY
                )));
            }
            if Some(&prop.name) == self.version_field.as_ref() {
                return Err(Error::invalid_input(format!(
                    "{}: '{}' is reserved for the version field",
                    self.name, prop.name
                )));
            }
            if !seen.insert(prop.name.as_str()) {
                return Err(Error::invalid_input(format!(
                    "{}: duplicate property '{}'",
                    self.name, prop.name
                )));
            }
            if prop.unique && prop.kind.is_json() {
                return Err(Error::invalid_input(format!(
                    "{}: JSON property '{}' cannot be unique",
                    self.name, prop.name
                )));
            }
        }
        if let Some(version) = &self.version_field {
            check_identifier(version, "version field")?;
            if version == PRIMARY_KEY {
                return Err(Error::invalid_input(format!(
                    "{}: version field cannot be '{}'",
                    self.name, PRIMARY_KEY
                )));
            }
        }
        Ok(())
    }
}

/// Builder for [`EntityMetadata`]
#[derive(Debug)]
pub struct EntityMetadataBuilder {
    name: String,
    collection: String,
    properties: Vec<PropertyMetadata>,
    version_field: Option<String>,
}

impl EntityMetadataBuilder {
    /// Override the collection/table name
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Add a property
    pub fn property(mut self, property: PropertyMetadata) -> Self {
        self.properties.push(property);
        self
    }

    /// Enable optimistic locking through an integer version field
    pub fn versioned(mut self, field: impl Into<String>) -> Self {
        self.version_field = Some(field.into());
        self
    }

    /// Finish the declaration
    pub fn build(self) -> EntityMetadata {
        EntityMetadata {
            name: self.name,
            collection: self.collection,
            properties: self.properties,
            version_field: self.version_field,
        }
    }
}

/// Identifiers end up in SQL text, so restrict them to `[A-Za-z_][A-Za-z0-9_]*`
fn check_identifier(s: &str, what: &str) -> Result<()> {
    let mut chars = s.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::invalid_input(format!("invalid {}: '{}'", what, s)))
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Immutable set of entity declarations
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    entities: BTreeMap<String, Arc<EntityMetadata>>,
}

impl MetadataRegistry {
    /// Start building a registry
    pub fn builder() -> MetadataRegistryBuilder {
        MetadataRegistryBuilder::default()
    }

    /// Look up an entity
    pub fn get(&self, name: &str) -> Option<Arc<EntityMetadata>> {
        self.entities.get(name).cloned()
    }

    /// Look up an entity or fail with `InvalidInput`
    pub fn require(&self, name: &str) -> Result<Arc<EntityMetadata>> {
        self.get(name)
            .ok_or_else(|| Error::invalid_input(format!("unknown entity '{}'", name)))
    }

    /// All entities, ordered by name
    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntityMetadata>> {
        self.entities.values()
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True if no entities are declared
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Builder for [`MetadataRegistry`]
#[derive(Debug, Default)]
pub struct MetadataRegistryBuilder {
    entities: Vec<EntityMetadata>,
}

impl MetadataRegistryBuilder {
    /// Add an entity declaration
    pub fn register(mut self, entity: EntityMetadata) -> Self {
        self.entities.push(entity);
        self
    }

    /// Validate all declarations and freeze them
    pub fn build(self) -> Result<MetadataRegistry> {
        let mut entities = BTreeMap::new();
        let mut collections = std::collections::BTreeSet::new();
        for entity in self.entities {
            entity.validate()?;
            if !collections.insert(entity.collection.clone()) {
                return Err(Error::invalid_input(format!(
                    "collection '{}' declared twice",
                    entity.collection
                )));
            }
            let name = entity.name.clone();
            if entities.insert(name.clone(), Arc::new(entity)).is_some() {
                return Err(Error::invalid_input(format!("entity '{}' declared twice", name)));
            }
        }
        Ok(MetadataRegistry { entities })
    }
}
