//! Cross-session isolation
//!
//! A session sees another session's flushed writes only on a fresh load.

use crate::common::*;

#[tokio::test]
async fn flushed_write_invisible_until_fresh_load() {
    across_backends(|orm| async move {
        let mut setup = orm.fork();
        create_user(&mut setup, "u1", "a@x", Value::from(json!({"a": 1})));
        setup.flush().await.unwrap();

        let (mut a, in_a) = load_fresh(&orm, "u1").await;
        let (mut b, in_b) = load_fresh(&orm, "u1").await;

        in_a.set("devices", Value::from(json!({"a": 2}))).unwrap();
        a.flush().await.unwrap();

        // cached handle and plain re-find both return B's tracked state
        assert_eq!(property(&orm, &in_b, "devices"), cv(json!({"a": 1})));
        let again = b.find_one_or_fail("User", &Filter::eq("email", "a@x")).await.unwrap();
        assert!(again.ptr_eq(&in_b));
        assert_eq!(property(&orm, &again, "devices"), cv(json!({"a": 1})));

        let refreshed = b
            .find_one_with("User", &Filter::id("u1"), FindOptions::refresh())
            .await
            .unwrap()
            .unwrap();
        assert!(refreshed.ptr_eq(&in_b));
        assert_eq!(property(&orm, &in_b, "devices"), cv(json!({"a": 2})));
    })
    .await;
}

#[tokio::test]
async fn refresh_and_clear_both_pick_up_writes() {
    across_backends(|orm| async move {
        let mut setup = orm.fork();
        create_user(&mut setup, "u1", "a@x", Value::Null);
        setup.flush().await.unwrap();

        let (mut b, in_b) = load_fresh(&orm, "u1").await;
        let (mut a, in_a) = load_fresh(&orm, "u1").await;
        in_a.set("email", "new@x").unwrap();
        a.flush().await.unwrap();

        b.refresh(&in_b).await.unwrap();
        assert_eq!(in_b.get("email").unwrap().as_str(), Some("new@x"));

        in_a.set("email", "newer@x").unwrap();
        a.flush().await.unwrap();
        b.clear();
        let fresh = b.find_one_or_fail("User", &Filter::id("u1")).await.unwrap();
        assert!(!fresh.ptr_eq(&in_b));
        assert_eq!(fresh.get("email").unwrap().as_str(), Some("newer@x"));
    })
    .await;
}

#[tokio::test]
async fn unflushed_changes_stay_private() {
    across_backends(|orm| async move {
        let mut a = orm.fork();
        create_user(&mut a, "u1", "a@x", Value::Null);

        let mut b = orm.fork();
        assert!(b.find_one("User", &Filter::id("u1")).await.unwrap().is_none());

        a.flush().await.unwrap();
        let found = b.find_one_or_fail("User", &Filter::id("u1")).await.unwrap();
        assert_eq!(found.get("email").unwrap().as_str(), Some("a@x"));
    })
    .await;
}

#[tokio::test]
async fn first_load_sees_latest_state() {
    across_backends(|orm| async move {
        let mut b = orm.fork();
        let mut a = b.fork();
        create_user(&mut a, "u1", "a@x", Value::from(json!({"v": 1})));
        a.flush().await.unwrap();

        let found = b.find_one_or_fail("User", &Filter::id("u1")).await.unwrap();
        assert_eq!(property(&orm, &found, "devices"), cv(json!({"v": 1})));
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sessions_on_separate_tasks() {
    for kind in [BackendKind::Document, BackendKind::Relational] {
        let orm = open(kind);
        let mut tasks = Vec::new();
        for i in 0..8 {
            let orm = orm.clone();
            tasks.push(tokio::spawn(async move {
                let mut em = orm.fork();
                let id = format!("u{}", i);
                create_user(&mut em, &id, &format!("{}@x", id), Value::from(json!({"n": i})));
                em.flush().await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut em = orm.fork();
        let all = em.find("User", &Filter::all()).await.unwrap();
        assert_eq!(all.len(), 8);
        let ids: Vec<String> = all.iter().map(|u| u.id().into_string()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
