//! DocumentStore: in-memory document backend
//!
//! Collections of nested documents with native datetime and binary values,
//! path-level updates and unique indexes.
//!
//! # Atomicity
//!
//! `apply` takes the write lock once, stages a copy of every collection the
//! batch touches, applies the ops to the copies and swaps them in only if
//! every op succeeded. Readers never observe a partially applied batch.
//!
//! # Unique indexes
//!
//! One index per unique field maps the field's value to the owning row.
//! Absent and null values are not indexed, so any number of rows may leave
//! a unique field empty.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use strata_core::EntityMetadata;
use tracing::debug;

use crate::backend::{
    Backend, BackendKind, BatchOutcome, Capabilities, PathUpdate, Update, VersionBump, WriteOp,
};
use crate::doc_value::DocValue;
use crate::error::{StorageError, StorageResult};
use crate::native::{NativeValue, Selector, StoredRow};

#[derive(Debug, Clone, Default)]
struct Doc {
    version: Option<u64>,
    fields: BTreeMap<String, DocValue>,
}

#[derive(Debug, Clone, Default)]
struct Collection {
    docs: BTreeMap<String, Doc>,
    /// field -> index key -> row id
    unique: FxHashMap<String, FxHashMap<String, String>>,
}

impl Collection {
    fn for_entity(entity: &EntityMetadata) -> Self {
        Collection {
            docs: BTreeMap::new(),
            unique: entity
                .unique_properties()
                .map(|p| (p.name.clone(), FxHashMap::default()))
                .collect(),
        }
    }

    fn check_unique(&self, name: &str, id: &str, fields: &BTreeMap<String, DocValue>) -> StorageResult<()> {
        for (field, index) in &self.unique {
            let Some(key) = fields.get(field).and_then(DocValue::index_key) else {
                continue;
            };
            if let Some(owner) = index.get(&key) {
                if owner != id {
                    return Err(StorageError::UniqueViolation {
                        collection: name.to_string(),
                        field: field.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn index(&mut self, id: &str, fields: &BTreeMap<String, DocValue>) {
        for (field, index) in self.unique.iter_mut() {
            if let Some(key) = fields.get(field).and_then(DocValue::index_key) {
                index.insert(key, id.to_string());
            }
        }
    }

    fn unindex(&mut self, fields: &BTreeMap<String, DocValue>) {
        for (field, index) in self.unique.iter_mut() {
            if let Some(key) = fields.get(field).and_then(DocValue::index_key) {
                index.remove(&key);
            }
        }
    }

    fn matches(id: &str, doc: &Doc, selector: &Selector) -> StorageResult<bool> {
        for (field, value) in &selector.conditions {
            let NativeValue::Document(expected) = value else {
                return Err(StorageError::Unsupported(format!(
                    "column value in document selector on '{}'",
                    field
                )));
            };
            let matched = if field == strata_core::PRIMARY_KEY {
                matches!(expected, DocValue::String(s) if s == id)
            } else {
                match doc.fields.get(field) {
                    Some(actual) => actual == expected,
                    None => expected.is_null(),
                }
            };
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// In-memory document store
#[derive(Debug, Default)]
pub struct DocumentStore {
    collections: RwLock<FxHashMap<String, Collection>>,
}

impl DocumentStore {
    /// Create an empty store
    pub fn new() -> Self {
        DocumentStore::default()
    }

    /// Number of rows in a collection (0 if it does not exist)
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.docs.len())
            .unwrap_or(0)
    }

    /// Raw stored field, for inspecting the native representation
    pub fn raw_field(&self, collection: &str, id: &str, field: &str) -> Option<DocValue> {
        self.collections
            .read()
            .get(collection)?
            .docs
            .get(id)?
            .fields
            .get(field)
            .cloned()
    }
}

fn into_doc_fields(
    collection: &str,
    fields: &BTreeMap<String, NativeValue>,
) -> StorageResult<BTreeMap<String, DocValue>> {
    fields
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(name, value)| match value {
            NativeValue::Document(v) => Ok((name.clone(), v.clone())),
            NativeValue::Column(_) => Err(StorageError::Unsupported(format!(
                "column value for {}.{} in document store",
                collection, name
            ))),
        })
        .collect()
}

fn check_version(
    collection: &str,
    id: &str,
    stored: Option<u64>,
    expected: Option<u64>,
) -> StorageResult<()> {
    match expected {
        Some(expected) if stored != Some(expected) => Err(StorageError::VersionMismatch {
            collection: collection.to_string(),
            id: id.to_string(),
            expected,
            actual: stored,
        }),
        _ => Ok(()),
    }
}

fn apply_op(name: &str, coll: &mut Collection, op: &WriteOp, outcome: &mut BatchOutcome) -> StorageResult<()> {
    match op {
        WriteOp::Insert {
            id, fields, version, ..
        } => {
            if coll.docs.contains_key(id) {
                return Err(StorageError::DuplicateKey {
                    collection: name.to_string(),
                    id: id.clone(),
                });
            }
            let fields = into_doc_fields(name, fields)?;
            coll.check_unique(name, id, &fields)?;
            coll.index(id, &fields);
            coll.docs.insert(
                id.clone(),
                Doc {
                    version: *version,
                    fields,
                },
            );
            outcome.inserted += 1;
        }
        WriteOp::Update {
            id, update, version, ..
        } => {
            let Some(doc) = coll.docs.get(id) else {
                return Err(StorageError::Missing {
                    collection: name.to_string(),
                    id: id.clone(),
                });
            };
            check_version(name, id, doc.version, version.map(|b| b.expected))?;

            let mut root = DocValue::Document(doc.fields.clone());
            match update {
                Update::Paths(paths) => {
                    for p in paths {
                        match p {
                            PathUpdate::Set(path, value) => root.set_path(path, value.clone())?,
                            PathUpdate::Unset(path) => root.unset_path(path)?,
                        }
                    }
                }
                Update::Columns(_) => {
                    return Err(StorageError::Unsupported(
                        "column update in document store".to_string(),
                    ))
                }
            }
            let DocValue::Document(mut new_fields) = root else {
                return Err(StorageError::Corrupt {
                    collection: name.to_string(),
                    reason: format!("row '{}' is no longer a document", id),
                });
            };
            new_fields.retain(|_, v| !v.is_null());

            let old_fields = doc.fields.clone();
            coll.unindex(&old_fields);
            if let Err(e) = coll.check_unique(name, id, &new_fields) {
                coll.index(id, &old_fields);
                return Err(e);
            }
            coll.index(id, &new_fields);

            let next_version = match version {
                Some(VersionBump { next, .. }) => Some(*next),
                None => coll.docs.get(id).and_then(|d| d.version),
            };
            coll.docs.insert(
                id.clone(),
                Doc {
                    version: next_version,
                    fields: new_fields,
                },
            );
            outcome.updated += 1;
        }
        WriteOp::Delete {
            id,
            expected_version,
            ..
        } => {
            match coll.docs.get(id) {
                Some(doc) => check_version(name, id, doc.version, *expected_version)?,
                None if expected_version.is_some() => {
                    return Err(StorageError::Missing {
                        collection: name.to_string(),
                        id: id.clone(),
                    })
                }
                None => return Ok(()),
            }
            if let Some(doc) = coll.docs.remove(id) {
                coll.unindex(&doc.fields);
                outcome.deleted += 1;
            }
        }
    }
    Ok(())
}

impl Backend for DocumentStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Document
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            partial_updates: true,
            native_datetime: true,
            native_binary: true,
        }
    }

    fn ensure_collection(&self, entity: &EntityMetadata) -> StorageResult<()> {
        let mut collections = self.collections.write();
        if !collections.contains_key(&entity.collection) {
            debug!(target: "strata::storage", collection = %entity.collection, "creating collection");
            collections.insert(entity.collection.clone(), Collection::for_entity(entity));
        }
        Ok(())
    }

    fn drop_collection(&self, collection: &str) -> StorageResult<()> {
        if self.collections.write().remove(collection).is_some() {
            debug!(target: "strata::storage", collection, "dropped collection");
        }
        Ok(())
    }

    fn find(
        &self,
        collection: &str,
        selector: &Selector,
        limit: Option<usize>,
    ) -> StorageResult<Vec<StoredRow>> {
        let collections = self.collections.read();
        let coll = collections
            .get(collection)
            .ok_or_else(|| StorageError::UnknownCollection(collection.to_string()))?;

        let mut rows = Vec::new();
        for (id, doc) in &coll.docs {
            if limit.is_some_and(|n| rows.len() >= n) {
                break;
            }
            if Collection::matches(id, doc, selector)? {
                rows.push(StoredRow {
                    id: id.clone(),
                    version: doc.version,
                    fields: doc
                        .fields
                        .iter()
                        .map(|(k, v)| (k.clone(), NativeValue::Document(v.clone())))
                        .collect(),
                });
            }
        }
        Ok(rows)
    }

    fn apply(&self, batch: &[WriteOp]) -> StorageResult<BatchOutcome> {
        let mut collections = self.collections.write();
        let mut staged: FxHashMap<String, Collection> = FxHashMap::default();
        let mut outcome = BatchOutcome::default();

        for op in batch {
            let name = op.collection();
            if !staged.contains_key(name) {
                let current = collections
                    .get(name)
                    .ok_or_else(|| StorageError::UnknownCollection(name.to_string()))?;
                staged.insert(name.to_string(), current.clone());
            }
            if let Some(coll) = staged.get_mut(name) {
                apply_op(name, coll, op, &mut outcome)?;
            }
        }

        collections.extend(staged);
        debug!(
            target: "strata::storage",
            inserted = outcome.inserted,
            updated = outcome.updated,
            deleted = outcome.deleted,
            "document batch applied"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{PropertyMetadata, ScalarType};

    fn user() -> EntityMetadata {
        EntityMetadata::builder("User")
            .property(PropertyMetadata::scalar("email", ScalarType::String).unique())
            .property(PropertyMetadata::json("devices"))
            .build()
    }

    fn insert(id: &str, email: &str) -> WriteOp {
        WriteOp::Insert {
            collection: "user".to_string(),
            id: id.to_string(),
            fields: [(
                "email".to_string(),
                NativeValue::Document(DocValue::String(email.to_string())),
            )]
            .into_iter()
            .collect(),
            version: None,
        }
    }

    #[test]
    fn test_failed_batch_leaves_store_untouched() {
        let store = DocumentStore::new();
        store.ensure_collection(&user()).unwrap();
        store.apply(&[insert("u1", "a@x")]).unwrap();

        let err = store
            .apply(&[insert("u2", "b@x"), insert("u3", "a@x")])
            .unwrap_err();
        assert!(matches!(err, StorageError::UniqueViolation { .. }));
        assert_eq!(store.count("user"), 1);
    }

    #[test]
    fn test_unique_index_follows_updates() {
        let store = DocumentStore::new();
        store.ensure_collection(&user()).unwrap();
        store.apply(&[insert("u1", "a@x")]).unwrap();
        store
            .apply(&[WriteOp::Update {
                collection: "user".to_string(),
                id: "u1".to_string(),
                update: Update::Paths(vec![PathUpdate::Set(
                    "email".parse().unwrap(),
                    DocValue::String("new@x".to_string()),
                )]),
                version: None,
            }])
            .unwrap();
        // the old value is free again
        store.apply(&[insert("u2", "a@x")]).unwrap();
        assert!(store.apply(&[insert("u3", "new@x")]).is_err());
    }

    #[test]
    fn test_unknown_collection() {
        let store = DocumentStore::new();
        assert!(matches!(
            store.find("nope", &Selector::all(), None),
            Err(StorageError::UnknownCollection(_))
        ));
    }
}
