//! Unique, primary-key and version conflicts at flush

use crate::common::*;

#[tokio::test]
async fn unique_conflict_across_sessions() {
    across_backends(|orm| async move {
        let mut first = orm.fork();
        create_user(&mut first, "u1", "same@x", Value::Null);
        first.flush().await.unwrap();

        let mut second = orm.fork();
        create_user(&mut second, "u2", "same@x", Value::Null);
        match second.flush().await.unwrap_err() {
            Error::Conflict { entity, reason } => {
                assert_eq!(entity, "user");
                assert!(reason.contains("email"), "reason: {}", reason);
            }
            other => panic!("unexpected {:?}", other),
        }
    })
    .await;
}

#[tokio::test]
async fn unique_conflict_when_both_pending() {
    across_backends(|orm| async move {
        let mut first = orm.fork();
        let mut second = orm.fork();
        create_user(&mut first, "u1", "same@x", Value::Null);
        create_user(&mut second, "u2", "same@x", Value::Null);

        first.flush().await.unwrap();
        let err = second.flush().await.unwrap_err();
        assert!(err.is_conflict());
        assert!(err.is_retryable());
    })
    .await;
}

#[tokio::test]
async fn unique_conflict_on_update() {
    across_backends(|orm| async move {
        let mut em = orm.fork();
        create_user(&mut em, "u1", "a@x", Value::Null);
        let second = create_user(&mut em, "u2", "b@x", Value::Null);
        em.flush().await.unwrap();

        second.set("email", "a@x").unwrap();
        assert!(em.flush().await.unwrap_err().is_conflict());

        second.set("email", "c@x").unwrap();
        assert_eq!(em.flush().await.unwrap().updated, 1);
    })
    .await;
}

#[tokio::test]
async fn duplicate_primary_key_across_sessions() {
    across_backends(|orm| async move {
        let mut first = orm.fork();
        create_user(&mut first, "u1", "a@x", Value::Null);
        first.flush().await.unwrap();

        let mut second = orm.fork();
        create_user(&mut second, "u1", "b@x", Value::Null);
        assert!(second.flush().await.unwrap_err().is_conflict());
    })
    .await;
}

#[tokio::test]
async fn failed_batch_writes_nothing() {
    across_backends(|orm| async move {
        let mut first = orm.fork();
        create_user(&mut first, "u1", "taken@x", Value::Null);
        first.flush().await.unwrap();

        let mut second = orm.fork();
        let fine = create_user(&mut second, "u2", "free@x", Value::Null);
        let clash = create_user(&mut second, "u3", "taken@x", Value::Null);
        assert!(second.flush().await.unwrap_err().is_conflict());

        let mut observer = orm.fork();
        assert!(observer
            .find_one("User", &Filter::eq("email", "free@x"))
            .await
            .unwrap()
            .is_none());

        assert_eq!(second.status(&fine), Some(strata_orm::EntityStatus::New));
        second.remove(&clash).unwrap();
        assert_eq!(second.flush().await.unwrap().inserted, 1);
    })
    .await;
}

#[tokio::test]
async fn stale_version_rejected() {
    across_backends(|orm| async move {
        let mut em = orm.fork();
        em.create_with_id("Event", "e1", [("title", "v1")]).unwrap();
        em.flush().await.unwrap();

        let mut a = orm.fork();
        let mut b = orm.fork();
        let in_a = a.find_one_or_fail("Event", &Filter::id("e1")).await.unwrap();
        let in_b = b.find_one_or_fail("Event", &Filter::id("e1")).await.unwrap();
        assert_eq!(in_a.version(), Some(1));

        in_a.set("title", "from a").unwrap();
        a.flush().await.unwrap();
        assert_eq!(in_a.version(), Some(2));

        in_b.set("title", "from b").unwrap();
        assert!(b.flush().await.unwrap_err().is_conflict());

        b.refresh(&in_b).await.unwrap();
        assert_eq!(in_b.version(), Some(2));
        in_b.set("title", "from b").unwrap();
        b.flush().await.unwrap();
        assert_eq!(in_b.version(), Some(3));
    })
    .await;
}

#[tokio::test]
async fn delete_of_stale_version_rejected() {
    across_backends(|orm| async move {
        let mut em = orm.fork();
        em.create_with_id("Event", "e1", [("title", "v1")]).unwrap();
        em.flush().await.unwrap();

        let mut a = orm.fork();
        let in_a = a.find_one_or_fail("Event", &Filter::id("e1")).await.unwrap();
        let mut b = orm.fork();
        let in_b = b.find_one_or_fail("Event", &Filter::id("e1")).await.unwrap();

        in_a.set("title", "v2").unwrap();
        a.flush().await.unwrap();

        b.remove(&in_b).unwrap();
        assert!(b.flush().await.unwrap_err().is_conflict());
    })
    .await;
}

#[tokio::test]
async fn required_property_enforced() {
    across_backends(|orm| async move {
        let mut em = orm.fork();
        let err = em.create("Event", [("at", Value::Null)]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));

        let event = em.create("Event", [("title", "t")]).unwrap();
        event.unset("title").unwrap();
        assert!(matches!(em.flush().await, Err(Error::InvalidInput { .. })));
    })
    .await;
}
