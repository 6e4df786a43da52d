//! Backend encodings
//!
//! An [`Encoding`] turns canonical property values into a backend's native
//! field values and back, and turns change sets into backend updates.
//!
//! | | DocumentEncoding | TextEncoding |
//! |---|---|---|
//! | JSON property | nested documents | one JSON text column |
//! | datetime, binary leaves | native | tagged form |
//! | date, uuid leaves | tagged form | tagged form |
//! | change set | per-path `$set` / `$unset` | touched properties rewritten whole |

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use strata_core::{
    CanonicalValue, EntityId, EntityMetadata, Error, JsonPath, LeafKind, PropertyKind,
    PropertyMetadata, Result, ScalarType, TypedLeaf,
};
use strata_storage::{ColumnValue, DocValue, NativeValue, PathUpdate, Update};
use uuid::Uuid;

use crate::codec::CodecRegistry;
use crate::diff::{ChangeOp, ChangeSet};

/// Converts between canonical values and a backend's native values
pub trait Encoding: Send + Sync {
    /// Native value for a whole property
    fn encode_property(&self, prop: &PropertyMetadata, value: &CanonicalValue) -> Result<NativeValue>;

    /// Canonical value of a stored property
    fn decode_property(&self, prop: &PropertyMetadata, value: &NativeValue) -> Result<CanonicalValue>;

    /// Native value of a primary key
    fn encode_id(&self, id: &EntityId) -> NativeValue;

    /// Backend update for a change set
    ///
    /// `live` holds the current value of every present property.
    fn encode_changes(
        &self,
        entity: &EntityMetadata,
        changes: &ChangeSet,
        live: &BTreeMap<String, CanonicalValue>,
    ) -> Result<Update>;
}

fn mismatch(path: JsonPath, expected: impl std::fmt::Display, found: &str) -> Error {
    Error::hydration(path, format!("expected {}, found {}", expected, found))
}

fn scalar_mismatch(prop: &PropertyMetadata, value: &CanonicalValue) -> Error {
    let declared = match &prop.kind {
        PropertyKind::Scalar(ty) => ty.name(),
        PropertyKind::Json(_) => "json",
    };
    Error::unsupported(
        JsonPath::property(prop.name.clone()),
        format!("{} for {} property", value.type_name(), declared),
    )
}

fn parse_uuid(path: JsonPath, s: &str) -> Result<CanonicalValue> {
    Uuid::parse_str(s)
        .map(|u| CanonicalValue::Typed(TypedLeaf::Uuid(u)))
        .map_err(|e| Error::hydration(path, format!("invalid uuid '{}': {}", s, e)))
}

fn parse_datetime(path: JsonPath, s: &str) -> Result<CanonicalValue> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| CanonicalValue::Typed(TypedLeaf::DateTime(dt.with_timezone(&Utc))))
        .map_err(|e| Error::hydration(path, format!("invalid datetime '{}': {}", s, e)))
}

// ============================================================================
// DocumentEncoding
// ============================================================================

/// Encoding for the document store
#[derive(Debug, Clone)]
pub struct DocumentEncoding {
    codecs: Arc<CodecRegistry>,
}

const DOCUMENT_NATIVE: &[LeafKind] = &[LeafKind::DateTime, LeafKind::Binary];

impl DocumentEncoding {
    /// Create the encoding
    pub fn new(codecs: Arc<CodecRegistry>) -> Self {
        DocumentEncoding { codecs }
    }

    fn to_doc(&self, value: &CanonicalValue, path: &JsonPath) -> Result<DocValue> {
        Ok(match value {
            CanonicalValue::Null => DocValue::Null,
            CanonicalValue::Bool(b) => DocValue::Bool(*b),
            CanonicalValue::Int(i) => DocValue::Int(*i),
            CanonicalValue::Float(f) => DocValue::Double(*f),
            CanonicalValue::String(s) => DocValue::String(s.clone()),
            CanonicalValue::Typed(TypedLeaf::DateTime(dt)) => DocValue::DateTime(*dt),
            CanonicalValue::Typed(TypedLeaf::Binary(b)) => DocValue::Binary(b.clone()),
            CanonicalValue::Typed(leaf) => {
                return Err(Error::unsupported(path.clone(), format!("untagged {}", leaf.kind())))
            }
            CanonicalValue::Array(items) => DocValue::Array(
                items
                    .iter()
                    .map(|v| self.to_doc(v, path))
                    .collect::<Result<_>>()?,
            ),
            CanonicalValue::Object(map) => DocValue::Document(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.to_doc(v, path)?)))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    fn from_doc(value: &DocValue) -> CanonicalValue {
        match value {
            DocValue::Null => CanonicalValue::Null,
            DocValue::Bool(b) => CanonicalValue::Bool(*b),
            DocValue::Int(i) => CanonicalValue::Int(*i),
            DocValue::Double(f) => CanonicalValue::Float(*f),
            DocValue::String(s) => CanonicalValue::String(s.clone()),
            DocValue::DateTime(dt) => CanonicalValue::Typed(TypedLeaf::DateTime(*dt)),
            DocValue::Binary(b) => CanonicalValue::Typed(TypedLeaf::Binary(b.clone())),
            DocValue::Array(items) => CanonicalValue::Array(items.iter().map(Self::from_doc).collect()),
            DocValue::Document(map) => CanonicalValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_doc(v)))
                    .collect(),
            ),
        }
    }

    /// Native form of a JSON subtree located at `path`
    fn encode_json(&self, value: &CanonicalValue, path: &JsonPath) -> Result<DocValue> {
        let tagged = self.codecs.encode_tree_except(value, DOCUMENT_NATIVE)?;
        self.to_doc(&tagged, path)
    }

    fn encode_scalar(&self, prop: &PropertyMetadata, ty: ScalarType, value: &CanonicalValue) -> Result<DocValue> {
        Ok(match (ty, value) {
            (_, CanonicalValue::Null) => DocValue::Null,
            (ScalarType::String, CanonicalValue::String(s)) => DocValue::String(s.clone()),
            (ScalarType::Int, CanonicalValue::Int(i)) => DocValue::Int(*i),
            (ScalarType::Float, CanonicalValue::Float(f)) => DocValue::Double(*f),
            (ScalarType::Bool, CanonicalValue::Bool(b)) => DocValue::Bool(*b),
            (ScalarType::DateTime, CanonicalValue::Typed(TypedLeaf::DateTime(dt))) => DocValue::DateTime(*dt),
            (ScalarType::Uuid, CanonicalValue::Typed(TypedLeaf::Uuid(u))) => {
                DocValue::String(u.hyphenated().to_string())
            }
            _ => return Err(scalar_mismatch(prop, value)),
        })
    }

    fn decode_scalar(prop: &PropertyMetadata, ty: ScalarType, value: &DocValue) -> Result<CanonicalValue> {
        let path = JsonPath::property(prop.name.clone());
        Ok(match (ty, value) {
            (_, DocValue::Null) => CanonicalValue::Null,
            (ScalarType::String, DocValue::String(s)) => CanonicalValue::String(s.clone()),
            (ScalarType::Int, DocValue::Int(i)) => CanonicalValue::Int(*i),
            (ScalarType::Float, DocValue::Double(f)) => CanonicalValue::Float(*f),
            (ScalarType::Bool, DocValue::Bool(b)) => CanonicalValue::Bool(*b),
            (ScalarType::DateTime, DocValue::DateTime(dt)) => CanonicalValue::Typed(TypedLeaf::DateTime(*dt)),
            (ScalarType::Uuid, DocValue::String(s)) => parse_uuid(path, s)?,
            (ty, other) => return Err(mismatch(path, ty, other.type_name())),
        })
    }
}

impl Encoding for DocumentEncoding {
    fn encode_property(&self, prop: &PropertyMetadata, value: &CanonicalValue) -> Result<NativeValue> {
        let doc = match &prop.kind {
            PropertyKind::Scalar(ty) => self.encode_scalar(prop, *ty, value)?,
            PropertyKind::Json(_) => self.encode_json(value, &JsonPath::property(prop.name.clone()))?,
        };
        Ok(NativeValue::Document(doc))
    }

    fn decode_property(&self, prop: &PropertyMetadata, value: &NativeValue) -> Result<CanonicalValue> {
        let path = JsonPath::property(prop.name.clone());
        let NativeValue::Document(doc) = value else {
            return Err(mismatch(path, "document value", "column value"));
        };
        match &prop.kind {
            PropertyKind::Scalar(ty) => Self::decode_scalar(prop, *ty, doc),
            PropertyKind::Json(hint) => {
                self.codecs
                    .decode_tree(&Self::from_doc(doc), Some(hint).filter(|h| !h.is_empty()), &path)
            }
        }
    }

    fn encode_id(&self, id: &EntityId) -> NativeValue {
        NativeValue::Document(DocValue::String(id.as_str().to_string()))
    }

    fn encode_changes(
        &self,
        entity: &EntityMetadata,
        changes: &ChangeSet,
        _live: &BTreeMap<String, CanonicalValue>,
    ) -> Result<Update> {
        let mut updates = Vec::with_capacity(changes.len());
        for change in changes {
            let name = change.path.property_name().ok_or_else(|| {
                Error::invalid_input(format!("change at {} has no property", change.path))
            })?;
            let prop = entity.require_property(name)?;
            match &change.op {
                ChangeOp::Unset => updates.push(PathUpdate::Unset(change.path.clone())),
                ChangeOp::Set(value) => {
                    let doc = if change.path.len() == 1 {
                        match self.encode_property(prop, value)? {
                            NativeValue::Document(doc) => doc,
                            NativeValue::Column(_) => {
                                return Err(Error::storage("column value from document encoding"))
                            }
                        }
                    } else {
                        self.encode_json(value, &change.path)?
                    };
                    updates.push(PathUpdate::Set(change.path.clone(), doc));
                }
            }
        }
        Ok(Update::Paths(updates))
    }
}

// ============================================================================
// TextEncoding
// ============================================================================

/// Encoding for the relational store: JSON properties as JSON text
#[derive(Debug, Clone)]
pub struct TextEncoding {
    codecs: Arc<CodecRegistry>,
}

impl TextEncoding {
    /// Create the encoding
    pub fn new(codecs: Arc<CodecRegistry>) -> Self {
        TextEncoding { codecs }
    }

    /// JSON text for a property value
    pub fn to_json_text(&self, value: &CanonicalValue, path: &JsonPath) -> Result<String> {
        let tagged = self.codecs.encode_tree(value)?;
        Ok(to_json(&tagged, path)?.to_string())
    }

    fn encode_scalar(prop: &PropertyMetadata, ty: ScalarType, value: &CanonicalValue) -> Result<ColumnValue> {
        Ok(match (ty, value) {
            (_, CanonicalValue::Null) => ColumnValue::Null,
            (ScalarType::String, CanonicalValue::String(s)) => ColumnValue::Text(s.clone()),
            (ScalarType::Int, CanonicalValue::Int(i)) => ColumnValue::Integer(*i),
            (ScalarType::Float, CanonicalValue::Float(f)) => ColumnValue::Real(*f),
            (ScalarType::Bool, CanonicalValue::Bool(b)) => ColumnValue::Integer(i64::from(*b)),
            (ScalarType::DateTime, CanonicalValue::Typed(TypedLeaf::DateTime(dt))) => {
                ColumnValue::Text(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            (ScalarType::Uuid, CanonicalValue::Typed(TypedLeaf::Uuid(u))) => {
                ColumnValue::Text(u.hyphenated().to_string())
            }
            _ => return Err(scalar_mismatch(prop, value)),
        })
    }

    fn decode_scalar(prop: &PropertyMetadata, ty: ScalarType, value: &ColumnValue) -> Result<CanonicalValue> {
        let path = JsonPath::property(prop.name.clone());
        Ok(match (ty, value) {
            (_, ColumnValue::Null) => CanonicalValue::Null,
            (ScalarType::String, ColumnValue::Text(s)) => CanonicalValue::String(s.clone()),
            (ScalarType::Int, ColumnValue::Integer(i)) => CanonicalValue::Int(*i),
            (ScalarType::Float, ColumnValue::Real(f)) => CanonicalValue::Float(*f),
            (ScalarType::Float, ColumnValue::Integer(i)) => CanonicalValue::Float(*i as f64),
            (ScalarType::Bool, ColumnValue::Integer(0)) => CanonicalValue::Bool(false),
            (ScalarType::Bool, ColumnValue::Integer(1)) => CanonicalValue::Bool(true),
            (ScalarType::DateTime, ColumnValue::Text(s)) => parse_datetime(path, s)?,
            (ScalarType::Uuid, ColumnValue::Text(s)) => parse_uuid(path, s)?,
            (ty, other) => return Err(mismatch(path, ty, &other.to_string())),
        })
    }
}

/// Convert a fully tagged canonical tree to `serde_json`
fn to_json(value: &CanonicalValue, path: &JsonPath) -> Result<serde_json::Value> {
    Ok(match value {
        CanonicalValue::Null => serde_json::Value::Null,
        CanonicalValue::Bool(b) => serde_json::Value::Bool(*b),
        CanonicalValue::Int(i) => serde_json::Value::Number((*i).into()),
        CanonicalValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| Error::unsupported(path.clone(), format!("non-finite float {}", f)))?,
        CanonicalValue::String(s) => serde_json::Value::String(s.clone()),
        CanonicalValue::Typed(leaf) => {
            return Err(Error::unsupported(path.clone(), format!("untagged {}", leaf.kind())))
        }
        CanonicalValue::Array(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|v| to_json(v, path))
                .collect::<Result<_>>()?,
        ),
        CanonicalValue::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), to_json(v, path)?)))
                .collect::<Result<_>>()?,
        ),
    })
}

impl Encoding for TextEncoding {
    fn encode_property(&self, prop: &PropertyMetadata, value: &CanonicalValue) -> Result<NativeValue> {
        let column = match &prop.kind {
            PropertyKind::Scalar(ty) => Self::encode_scalar(prop, *ty, value)?,
            PropertyKind::Json(_) if value.is_null() => ColumnValue::Null,
            PropertyKind::Json(_) => {
                ColumnValue::Text(self.to_json_text(value, &JsonPath::property(prop.name.clone()))?)
            }
        };
        Ok(NativeValue::Column(column))
    }

    fn decode_property(&self, prop: &PropertyMetadata, value: &NativeValue) -> Result<CanonicalValue> {
        let path = JsonPath::property(prop.name.clone());
        let NativeValue::Column(column) = value else {
            return Err(mismatch(path, "column value", "document value"));
        };
        match &prop.kind {
            PropertyKind::Scalar(ty) => Self::decode_scalar(prop, *ty, column),
            PropertyKind::Json(hint) => match column {
                ColumnValue::Null => Ok(CanonicalValue::Null),
                ColumnValue::Text(text) => {
                    let json: serde_json::Value = serde_json::from_str(text)
                        .map_err(|e| Error::hydration(path.clone(), format!("malformed JSON: {}", e)))?;
                    self.codecs.decode_tree(
                        &CanonicalValue::from(json),
                        Some(hint).filter(|h| !h.is_empty()),
                        &path,
                    )
                }
                other => Err(mismatch(path, "JSON text", &other.to_string())),
            },
        }
    }

    fn encode_id(&self, id: &EntityId) -> NativeValue {
        NativeValue::Column(ColumnValue::Text(id.as_str().to_string()))
    }

    fn encode_changes(
        &self,
        entity: &EntityMetadata,
        changes: &ChangeSet,
        live: &BTreeMap<String, CanonicalValue>,
    ) -> Result<Update> {
        let mut columns = BTreeMap::new();
        for name in changes.touched_properties() {
            let prop = entity.require_property(&name)?;
            let column = match live.get(&name) {
                Some(value) => match self.encode_property(prop, value)? {
                    NativeValue::Column(column) => column,
                    NativeValue::Document(_) => {
                        return Err(Error::storage("document value from text encoding"))
                    }
                },
                None => ColumnValue::Null,
            };
            columns.insert(name, column);
        }
        Ok(Update::Columns(columns))
    }
}
