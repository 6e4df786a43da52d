//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::future::Future;
use std::sync::Once;

pub use serde_json::json;
pub use strata_orm::{
    BackendKind, CanonicalValue, EntityManager, EntityMetadata, EntityRef, Error, Filter,
    FindOptions, JsonHint, MetadataRegistry, Object, Orm, OrmConfig, PropertyMetadata,
    ScalarType, TypedLeaf, Value,
};

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness (shown with `--nocapture`)
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

// ============================================================================
// Schema
// ============================================================================

/// `User` with a unique email and two JSON properties; `Event` with a
/// datetime column and a hinted JSON payload
pub fn registry() -> MetadataRegistry {
    MetadataRegistry::builder()
        .register(
            EntityMetadata::builder("User")
                .property(PropertyMetadata::scalar("email", ScalarType::String).unique())
                .property(PropertyMetadata::json("devices"))
                .property(PropertyMetadata::json("profile"))
                .build(),
        )
        .register(
            EntityMetadata::builder("Event")
                .property(PropertyMetadata::scalar("title", ScalarType::String).required())
                .property(PropertyMetadata::scalar("at", ScalarType::DateTime))
                .property(PropertyMetadata::json_with_hint(
                    "payload",
                    JsonHint::new().datetime("history[*].at"),
                ))
                .versioned("version")
                .build(),
        )
        .build()
        .expect("test registry is valid")
}

// ============================================================================
// ORM factories
// ============================================================================

/// Fresh ORM on the given backend, in memory
pub fn open(kind: BackendKind) -> Orm {
    init_tracing();
    let config = match kind {
        BackendKind::Document => OrmConfig::document(),
        BackendKind::Relational => OrmConfig::relational(),
    }
    .with_log_queries(true);
    Orm::open(config, registry()).expect("open orm")
}

/// Run `test` once per backend, each with a fresh ORM
pub async fn across_backends<F, Fut>(test: F)
where
    F: Fn(Orm) -> Fut,
    Fut: Future<Output = ()>,
{
    for kind in [BackendKind::Document, BackendKind::Relational] {
        tracing::info!(target: "strata::test", backend = %kind, "running");
        test(open(kind)).await;
    }
}

// ============================================================================
// Value helpers
// ============================================================================

/// Canonical form of a live value (own fields only)
pub fn canonical(orm: &Orm, value: &Value) -> CanonicalValue {
    strata_mapping::extract(value, orm.codecs()).expect("extractable value")
}

/// Canonical form of an entity property; `Null` when unset
pub fn property(orm: &Orm, entity: &EntityRef, name: &str) -> CanonicalValue {
    match entity.get(name) {
        Some(value) => canonical(orm, &value),
        None => CanonicalValue::Null,
    }
}

/// Canonical value from JSON
pub fn cv(value: serde_json::Value) -> CanonicalValue {
    CanonicalValue::from(value)
}

/// Create a `User` in `em` with the given id, email and devices
pub fn create_user(em: &mut EntityManager, id: &str, email: &str, devices: Value) -> EntityRef {
    em.create_with_id(
        "User",
        id,
        [("email", Value::from(email)), ("devices", devices)],
    )
    .expect("create user")
}

/// Load a `User` by id in a brand new session
pub async fn load_fresh(orm: &Orm, id: &str) -> (EntityManager, EntityRef) {
    let mut em = orm.fork();
    let user = em
        .find_one_or_fail("User", &Filter::id(id))
        .await
        .expect("user exists");
    (em, user)
}
