//! Snapshot diffing and flush behavior

use crate::common::*;

fn rendered(em: &EntityManager, entity: &EntityRef) -> Vec<String> {
    em.changes(entity)
        .unwrap()
        .iter()
        .map(|c| c.to_string())
        .collect()
}

// ============================================================================
// No-op detection
// ============================================================================

#[tokio::test]
async fn structurally_equal_replacement_is_noop() {
    across_backends(|orm| async move {
        let mut em = orm.fork();
        create_user(&mut em, "u1", "a@x", Value::from(json!({"a": 1, "list": [1, 2]})));
        em.flush().await.unwrap();

        let (mut other, user) = load_fresh(&orm, "u1").await;
        user.set("devices", Value::from(json!({"list": [1, 2], "a": 1})))
            .unwrap();
        user.set("email", "a@x").unwrap();
        assert!(other.changes(&user).unwrap().is_empty());

        let summary = other.flush().await.unwrap();
        assert!(summary.is_noop());
        assert_eq!(summary.unchanged, 1);
    })
    .await;
}

#[tokio::test]
async fn loaded_entity_untouched_is_noop() {
    across_backends(|orm| async move {
        let mut em = orm.fork();
        create_user(&mut em, "u1", "a@x", Value::from(json!({"a": 1.5, "b": null})));
        em.flush().await.unwrap();

        let (mut other, _user) = load_fresh(&orm, "u1").await;
        assert!(other.flush().await.unwrap().is_noop());
    })
    .await;
}

// ============================================================================
// Change sets
// ============================================================================

#[tokio::test]
async fn nested_mutation_yields_leaf_change() {
    across_backends(|orm| async move {
        let mut em = orm.fork();
        let user = create_user(
            &mut em,
            "u1",
            "a@x",
            Value::from(json!({"mouse": {"brand": "acme", "dpi": 800}, "keyboard": "k"})),
        );
        em.flush().await.unwrap();

        let devices = user.get("devices").unwrap();
        let mouse = devices.as_object().unwrap().get("mouse").unwrap();
        mouse.as_object().unwrap().set("dpi", 1600);
        devices.as_object().unwrap().remove("keyboard");
        assert_eq!(
            rendered(&em, &user),
            vec!["unset devices.keyboard", "set devices.mouse.dpi = Int(1600)"]
        );

        assert_eq!(em.flush().await.unwrap().updated, 1);
        let (_fresh, reloaded) = load_fresh(&orm, "u1").await;
        assert_eq!(
            property(&orm, &reloaded, "devices"),
            cv(json!({"mouse": {"brand": "acme", "dpi": 1600}}))
        );
    })
    .await;
}

#[tokio::test]
async fn array_length_change_rewrites_array() {
    across_backends(|orm| async move {
        let mut em = orm.fork();
        let user = create_user(&mut em, "u1", "a@x", Value::from(json!({"list": [1, 2, 3]})));
        em.flush().await.unwrap();

        let devices = user.get("devices").unwrap();
        let list = devices.as_object().unwrap().get("list").unwrap();
        list.as_array().unwrap().pop();
        assert_eq!(rendered(&em, &user), vec!["set devices.list = Array([Int(1), Int(2)])"]);
        em.flush().await.unwrap();

        let (_fresh, reloaded) = load_fresh(&orm, "u1").await;
        assert_eq!(property(&orm, &reloaded, "devices"), cv(json!({"list": [1, 2]})));
    })
    .await;
}

#[tokio::test]
async fn array_element_change_in_place() {
    across_backends(|orm| async move {
        let mut em = orm.fork();
        let user = create_user(&mut em, "u1", "a@x", Value::from(json!({"list": [{"n": 1}, {"n": 2}]})));
        em.flush().await.unwrap();

        let devices = user.get("devices").unwrap();
        let list = devices.as_object().unwrap().get("list").unwrap();
        list.as_array().unwrap().get(1).unwrap().as_object().unwrap().set("n", 5);
        assert_eq!(rendered(&em, &user), vec!["set devices.list[1].n = Int(5)"]);
        em.flush().await.unwrap();

        let (_fresh, reloaded) = load_fresh(&orm, "u1").await;
        assert_eq!(
            property(&orm, &reloaded, "devices"),
            cv(json!({"list": [{"n": 1}, {"n": 5}]}))
        );
    })
    .await;
}

#[tokio::test]
async fn kind_change_and_unset_property() {
    across_backends(|orm| async move {
        let mut em = orm.fork();
        let user = create_user(&mut em, "u1", "a@x", Value::from(json!({"mouse": {"brand": "acme"}})));
        user.set("profile", Value::from(json!({"bio": "hi"}))).unwrap();
        em.flush().await.unwrap();

        user.get("devices")
            .unwrap()
            .as_object()
            .unwrap()
            .set("mouse", "none");
        user.unset("profile").unwrap();
        assert_eq!(
            rendered(&em, &user),
            vec!["set devices.mouse = String(\"none\")", "unset profile"]
        );
        em.flush().await.unwrap();

        let (_fresh, reloaded) = load_fresh(&orm, "u1").await;
        assert_eq!(property(&orm, &reloaded, "devices"), cv(json!({"mouse": "none"})));
        assert!(reloaded.get("profile").is_none());
    })
    .await;
}

#[tokio::test]
async fn null_assignment_clears_property() {
    across_backends(|orm| async move {
        let mut em = orm.fork();
        let user = create_user(&mut em, "u1", "a@x", Value::from(json!({"a": 1})));
        em.flush().await.unwrap();

        user.set("devices", Value::Null).unwrap();
        assert_eq!(rendered(&em, &user), vec!["unset devices"]);
        em.flush().await.unwrap();

        let mut fresh = orm.fork();
        let found = fresh
            .find_one("User", &Filter::eq("email", "a@x"))
            .await
            .unwrap()
            .unwrap();
        assert!(found.get("devices").is_none());
    })
    .await;
}

// ============================================================================
// Backend-specific update shape
// ============================================================================

#[tokio::test]
async fn document_store_merges_disjoint_path_updates() {
    let orm = open(BackendKind::Document);
    let mut em = orm.fork();
    create_user(&mut em, "u1", "a@x", Value::from(json!({"a": 1, "b": 1})));
    em.flush().await.unwrap();

    let (mut first, in_first) = load_fresh(&orm, "u1").await;
    let (mut second, in_second) = load_fresh(&orm, "u1").await;
    in_first.get("devices").unwrap().as_object().unwrap().set("a", 2);
    in_second.get("devices").unwrap().as_object().unwrap().set("b", 2);
    first.flush().await.unwrap();
    second.flush().await.unwrap();

    let (_fresh, reloaded) = load_fresh(&orm, "u1").await;
    assert_eq!(property(&orm, &reloaded, "devices"), cv(json!({"a": 2, "b": 2})));
}

#[tokio::test]
async fn relational_store_rewrites_whole_property() {
    let orm = open(BackendKind::Relational);
    let mut em = orm.fork();
    create_user(&mut em, "u1", "a@x", Value::from(json!({"a": 1, "b": 1})));
    em.flush().await.unwrap();

    let (mut first, in_first) = load_fresh(&orm, "u1").await;
    let (mut second, in_second) = load_fresh(&orm, "u1").await;
    in_first.get("devices").unwrap().as_object().unwrap().set("a", 2);
    in_second.get("devices").unwrap().as_object().unwrap().set("b", 2);
    first.flush().await.unwrap();
    second.flush().await.unwrap();

    // last writer wins on the whole column
    let (_fresh, reloaded) = load_fresh(&orm, "u1").await;
    assert_eq!(property(&orm, &reloaded, "devices"), cv(json!({"a": 1, "b": 2})));
}
