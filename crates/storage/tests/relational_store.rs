//! Integration tests for the SQLite store
//!
//! - JSON properties are stored as TEXT and read back verbatim
//! - UNIQUE and PRIMARY KEY failures map to storage constraint errors
//! - Batches run in one transaction
//! - File-backed databases survive reopening

use std::collections::BTreeMap;

use strata_core::{EntityMetadata, PropertyMetadata, ScalarType};
use strata_storage::{
    Backend, ColumnValue, NativeValue, RelationalStore, Selector, StorageError, Update,
    VersionBump, WriteOp,
};
use tempfile::TempDir;

// ============================================================================
// Helper Functions
// ============================================================================

fn user_entity() -> EntityMetadata {
    EntityMetadata::builder("User")
        .property(PropertyMetadata::scalar("email", ScalarType::String).unique())
        .property(PropertyMetadata::scalar("age", ScalarType::Int))
        .property(PropertyMetadata::json("devices"))
        .versioned("version")
        .build()
}

fn store() -> RelationalStore {
    let store = RelationalStore::open_in_memory().unwrap();
    store.ensure_collection(&user_entity()).unwrap();
    store
}

fn text(s: &str) -> ColumnValue {
    ColumnValue::Text(s.to_string())
}

fn insert_user(id: &str, email: &str, devices: &str) -> WriteOp {
    let fields: BTreeMap<String, NativeValue> = [
        ("email".to_string(), NativeValue::Column(text(email))),
        ("devices".to_string(), NativeValue::Column(text(devices))),
    ]
    .into_iter()
    .collect();
    WriteOp::Insert {
        collection: "user".to_string(),
        id: id.to_string(),
        fields,
        version: Some(1),
    }
}

fn set_devices(id: &str, devices: &str, version: Option<VersionBump>) -> WriteOp {
    WriteOp::Update {
        collection: "user".to_string(),
        id: id.to_string(),
        update: Update::Columns([("devices".to_string(), text(devices))].into_iter().collect()),
        version,
    }
}

// ============================================================================
// Round trips
// ============================================================================

#[test]
fn test_json_text_round_trip() {
    let store = store();
    let payload = r#"{"bought":{"$type":"datetime","$value":"2024-05-01T08:30:00Z"}}"#;
    store.apply(&[insert_user("u1", "a@x", payload)]).unwrap();

    assert_eq!(store.raw_column("user", "u1", "devices").unwrap(), text(payload));

    let rows = store.find("user", &Selector::all(), None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].version, Some(1));
    assert_eq!(
        rows[0].fields.get("devices"),
        Some(&NativeValue::Column(text(payload)))
    );
    // NULL columns are absent
    assert!(!rows[0].fields.contains_key("age"));
}

#[test]
fn test_null_selector_uses_is_null() {
    let store = store();
    store.apply(&[insert_user("u1", "a@x", "{}")]).unwrap();
    let rows = store
        .find("user", &Selector::all().and_eq("age", ColumnValue::Null), None)
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_update_rewrites_column_and_bumps_version() {
    let store = store();
    store.apply(&[insert_user("u1", "a@x", r#"{"a":1}"#)]).unwrap();
    let outcome = store
        .apply(&[set_devices("u1", r#"{"a":2}"#, Some(VersionBump { expected: 1, next: 2 }))])
        .unwrap();
    assert_eq!(outcome.updated, 1);

    let rows = store
        .find("user", &Selector::all().and_eq("id", text("u1")), None)
        .unwrap();
    assert_eq!(rows[0].version, Some(2));
    assert_eq!(rows[0].fields.get("devices"), Some(&NativeValue::Column(text(r#"{"a":2}"#))));
}

// ============================================================================
// Constraints
// ============================================================================

#[test]
fn test_unique_violation_names_column() {
    let store = store();
    store.apply(&[insert_user("u1", "same@x", "{}")]).unwrap();
    let err = store.apply(&[insert_user("u2", "same@x", "{}")]).unwrap_err();
    match err {
        StorageError::UniqueViolation { collection, field } => {
            assert_eq!(collection, "user");
            assert_eq!(field, "email");
        }
        other => panic!("expected unique violation, got {:?}", other),
    }
}

#[test]
fn test_duplicate_primary_key() {
    let store = store();
    store.apply(&[insert_user("u1", "a@x", "{}")]).unwrap();
    let err = store.apply(&[insert_user("u1", "b@x", "{}")]).unwrap_err();
    assert!(matches!(err, StorageError::DuplicateKey { .. }));
}

#[test]
fn test_stale_version_and_missing_row() {
    let store = store();
    store.apply(&[insert_user("u1", "a@x", "{}")]).unwrap();
    store
        .apply(&[set_devices("u1", "[]", Some(VersionBump { expected: 1, next: 2 }))])
        .unwrap();

    let stale = store
        .apply(&[set_devices("u1", "[1]", Some(VersionBump { expected: 1, next: 2 }))])
        .unwrap_err();
    assert!(matches!(
        stale,
        StorageError::VersionMismatch { expected: 1, actual: Some(2), .. }
    ));

    let missing = store.apply(&[set_devices("ghost", "[]", None)]).unwrap_err();
    assert!(matches!(missing, StorageError::Missing { .. }));
}

#[test]
fn test_failed_batch_rolls_back() {
    let store = store();
    store.apply(&[insert_user("u1", "a@x", "{}")]).unwrap();
    let result = store.apply(&[
        insert_user("u2", "b@x", "{}"),
        insert_user("u3", "a@x", "{}"),
    ]);
    assert!(result.is_err());
    assert_eq!(store.find("user", &Selector::all(), None).unwrap().len(), 1);
}

// ============================================================================
// Schema
// ============================================================================

#[test]
fn test_drop_collection() {
    let store = store();
    store.apply(&[insert_user("u1", "a@x", "{}")]).unwrap();
    store.drop_collection("user").unwrap();
    assert!(matches!(
        store.find("user", &Selector::all(), None),
        Err(StorageError::UnknownCollection(_))
    ));
    store.ensure_collection(&user_entity()).unwrap();
    assert!(store.find("user", &Selector::all(), None).unwrap().is_empty());
}

#[test]
fn test_file_database_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("orm.db");
    {
        let store = RelationalStore::open(&path).unwrap();
        store.ensure_collection(&user_entity()).unwrap();
        store.apply(&[insert_user("u1", "a@x", r#"{"k":"v"}"#)]).unwrap();
    }

    let store = RelationalStore::open(&path).unwrap();
    store.ensure_collection(&user_entity()).unwrap();
    let rows = store.find("user", &Selector::all(), None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].fields.get("devices"), Some(&NativeValue::Column(text(r#"{"k":"v"}"#))));
}
