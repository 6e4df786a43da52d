//! Own-fields-only persistence
//!
//! Fields an object only reaches through its prototype are never written,
//! neither at creation nor on later updates.

use crate::common::*;

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn prototype_fields_not_persisted_on_create() {
    across_backends(|orm| async move {
        let defaults = Object::from_entries([("mouse", "no-brand"), ("theme", "dark")]);
        let devices = Object::with_prototype(&defaults);
        devices.set("keyboard", "acme");
        assert_eq!(devices.get("mouse").unwrap().as_str(), Some("no-brand"));

        let mut em = orm.fork();
        create_user(&mut em, "u1", "a@x", devices.into());
        em.flush().await.unwrap();

        let (_em, user) = load_fresh(&orm, "u1").await;
        assert_eq!(property(&orm, &user, "devices"), cv(json!({"keyboard": "acme"})));
        let loaded = user.get("devices").unwrap();
        let loaded = loaded.as_object().unwrap();
        assert!(loaded.get("mouse").is_none());
        assert!(loaded.prototype().is_none());
    })
    .await;
}

#[tokio::test]
async fn nested_prototype_fields_not_persisted() {
    across_backends(|orm| async move {
        let defaults = Object::from_entries([("dpi", 800)]);
        let mouse = Object::with_prototype(&defaults);
        mouse.set("brand", "acme");
        let devices = Object::from_entries([("mouse", mouse)]);

        let mut em = orm.fork();
        create_user(&mut em, "u1", "a@x", devices.into());
        em.flush().await.unwrap();

        let (_em, user) = load_fresh(&orm, "u1").await;
        assert_eq!(
            property(&orm, &user, "devices"),
            cv(json!({"mouse": {"brand": "acme"}}))
        );
    })
    .await;
}

#[tokio::test]
async fn hidden_fields_not_persisted() {
    across_backends(|orm| async move {
        let devices = Object::from_entries([("mouse", "acme")]);
        devices.define_hidden("cache", "scratch");

        let mut em = orm.fork();
        create_user(&mut em, "u1", "a@x", devices.into());
        em.flush().await.unwrap();

        let (_em, user) = load_fresh(&orm, "u1").await;
        assert_eq!(property(&orm, &user, "devices"), cv(json!({"mouse": "acme"})));
    })
    .await;
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn update_path_parity_across_three_sessions() {
    across_backends(|orm| async move {
        let mut first = orm.fork();
        create_user(&mut first, "u1", "a@x", Value::from(json!({"a": 1, "b": 1})));
        first.flush().await.unwrap();

        let (mut second, user) = load_fresh(&orm, "u1").await;
        let base = Object::from_entries([("a", 1)]);
        let next = Object::with_prototype(&base);
        next.set("a", 2);
        next.set("b", 2);
        user.set("devices", next).unwrap();
        let summary = second.flush().await.unwrap();
        assert_eq!(summary.updated, 1);

        let (_third, reloaded) = load_fresh(&orm, "u1").await;
        assert_eq!(property(&orm, &reloaded, "devices"), cv(json!({"a": 2, "b": 2})));
    })
    .await;
}

#[tokio::test]
async fn field_only_on_prototype_is_removed_on_update() {
    across_backends(|orm| async move {
        let mut first = orm.fork();
        create_user(&mut first, "u1", "a@x", Value::from(json!({"a": 1, "b": 1})));
        first.flush().await.unwrap();

        let (mut second, user) = load_fresh(&orm, "u1").await;
        let base = Object::from_entries([("a", 1)]);
        let next = Object::with_prototype(&base);
        next.set("b", 2);
        user.set("devices", next).unwrap();
        second.flush().await.unwrap();

        let (_third, reloaded) = load_fresh(&orm, "u1").await;
        assert_eq!(property(&orm, &reloaded, "devices"), cv(json!({"b": 2})));
    })
    .await;
}

#[tokio::test]
async fn shadowing_prototype_field_persists_own_value() {
    across_backends(|orm| async move {
        let mut em = orm.fork();
        let user = create_user(&mut em, "u1", "a@x", Value::from(json!({"a": 1})));
        em.flush().await.unwrap();

        let defaults = Object::from_entries([("a", 5), ("c", 5)]);
        let next = Object::with_prototype(&defaults);
        next.set("a", 3);
        user.set("devices", next).unwrap();
        em.flush().await.unwrap();

        let (_other, reloaded) = load_fresh(&orm, "u1").await;
        assert_eq!(property(&orm, &reloaded, "devices"), cv(json!({"a": 3})));
    })
    .await;
}

// ============================================================================
// Rejected values
// ============================================================================

#[tokio::test]
async fn native_value_rejected_at_flush_with_path() {
    across_backends(|orm| async move {
        let mut em = orm.fork();
        let user = create_user(&mut em, "u1", "a@x", Value::from(json!({"a": 1})));
        em.flush().await.unwrap();

        let devices = user.get("devices").unwrap();
        devices
            .as_object()
            .unwrap()
            .set("hook", strata_orm::NativeHandle::new(42u32));
        match em.flush().await.unwrap_err() {
            Error::UnsupportedValueKind { path, .. } => assert_eq!(path.to_string(), "devices.hook"),
            other => panic!("unexpected {:?}", other),
        }
    })
    .await;
}
