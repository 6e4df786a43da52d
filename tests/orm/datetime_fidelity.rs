//! Typed leaves survive storage on both backends

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use strata_mapping::{CodecRegistry, DocumentEncoding, Encoding, TextEncoding};
use uuid::Uuid;

use crate::common::*;

fn instant() -> DateTime<Utc> {
    Utc.timestamp_opt(1_714_552_200, 123_456_789).unwrap()
}

fn serial() -> Uuid {
    Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap()
}

fn due() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
}

/// `{"price": {"$type": "money", "$value": {at, serial, due}}}`
fn money_with_leaves() -> Value {
    let receipt = Object::from_entries([
        ("at", Value::from(instant())),
        ("serial", Value::from(serial())),
        ("due", Value::from(due())),
    ]);
    let price = Object::from_entries([("$type", Value::from("money")), ("$value", Value::from(receipt))]);
    Object::from_entries([("price", Value::from(price))]).into()
}

fn assert_receipt_leaves(stored: &CanonicalValue) {
    let price = stored.get("price").unwrap();
    assert_eq!(price.get("$type").unwrap().as_str(), Some("money"));
    let receipt = price.get("$value").unwrap();
    assert_eq!(receipt.get("at").unwrap().as_datetime(), Some(&instant()));
    assert_eq!(receipt.get("serial").unwrap().as_typed(), Some(&TypedLeaf::Uuid(serial())));
    assert_eq!(receipt.get("due").unwrap().as_typed(), Some(&TypedLeaf::Date(due())));
}

// ============================================================================
// Encoding level
// ============================================================================

#[test]
fn datetime_round_trips_through_both_tagged_forms() {
    let codecs = Arc::new(CodecRegistry::standard());
    let prop = PropertyMetadata::json("payload");
    let value = cv(json!({"nested": {"deeper": null}}));
    let mut with_leaf = value.as_object().unwrap().clone();
    with_leaf.insert("at".to_string(), CanonicalValue::from(instant()));
    let value = CanonicalValue::Object(with_leaf);

    let document = DocumentEncoding::new(Arc::clone(&codecs));
    let stored = document.encode_property(&prop, &value).unwrap();
    assert_eq!(document.decode_property(&prop, &stored).unwrap(), value);

    let text = TextEncoding::new(codecs);
    let stored = text.encode_property(&prop, &value).unwrap();
    assert_eq!(text.decode_property(&prop, &stored).unwrap(), value);
}

// ============================================================================
// Full cycle
// ============================================================================

#[tokio::test]
async fn nested_datetime_reloads_as_datetime() {
    across_backends(|orm| async move {
        let devices = Object::from_entries([("mouse", Value::from("acme")), ("bought", Value::from(instant()))]);

        let mut em = orm.fork();
        let user = create_user(&mut em, "u1", "a@x", devices.into());
        em.flush().await.unwrap();
        em.clear();

        let reloaded = em.find_one_or_fail("User", &Filter::id("u1")).await.unwrap();
        assert!(!reloaded.ptr_eq(&user));
        let devices = reloaded.get("devices").unwrap();
        let bought = devices.as_object().unwrap().get("bought").unwrap();
        assert_eq!(bought.as_datetime(), Some(&instant()));
    })
    .await;
}

#[tokio::test]
async fn datetime_column_keeps_subsecond_precision() {
    across_backends(|orm| async move {
        let mut em = orm.fork();
        em.create_with_id(
            "Event",
            "e1",
            [("title", Value::from("launch")), ("at", Value::from(instant()))],
        )
        .unwrap();
        em.flush().await.unwrap();

        let mut fresh = orm.fork();
        let event = fresh.find_one_or_fail("Event", &Filter::id("e1")).await.unwrap();
        assert_eq!(event.get("at").unwrap().as_datetime(), Some(&instant()));
    })
    .await;
}

#[tokio::test]
async fn datetimes_inside_arrays_survive() {
    across_backends(|orm| async move {
        let payload = Value::from(json!({"history": [{"n": 1}, {"n": 2}]}));
        let history = payload.as_object().unwrap().get("history").unwrap();
        for item in history.as_array().unwrap().to_vec() {
            item.as_object().unwrap().set("at", instant());
        }

        let mut em = orm.fork();
        em.create_with_id("Event", "e1", [("title", Value::from("t")), ("payload", payload)])
            .unwrap();
        em.flush().await.unwrap();

        let mut fresh = orm.fork();
        let event = fresh.find_one_or_fail("Event", &Filter::id("e1")).await.unwrap();
        let stored = property(&orm, &event, "payload");
        let items = stored.get("history").unwrap().as_array().unwrap();
        assert_eq!(items.len(), 2);
        for item in items {
            assert_eq!(item.get("at").unwrap().as_datetime(), Some(&instant()));
        }
    })
    .await;
}

#[tokio::test]
async fn hint_recovers_datetime_written_as_string() {
    across_backends(|orm| async move {
        let payload = Value::from(json!({"history": [{"at": "2024-05-01T08:30:00Z"}]}));
        let mut em = orm.fork();
        em.create_with_id("Event", "e1", [("title", Value::from("t")), ("payload", payload)])
            .unwrap();
        em.flush().await.unwrap();

        let mut fresh = orm.fork();
        let event = fresh.find_one_or_fail("Event", &Filter::id("e1")).await.unwrap();
        let stored = property(&orm, &event, "payload");
        let at = stored.get("history").unwrap().as_array().unwrap()[0].get("at").unwrap();
        assert_eq!(
            at.as_datetime(),
            Some(&Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap())
        );
    })
    .await;
}

#[tokio::test]
async fn hinted_path_with_garbage_fails_hydration() {
    across_backends(|orm| async move {
        let payload = Value::from(json!({"history": [{"at": "next tuesday"}]}));
        let mut em = orm.fork();
        em.create_with_id("Event", "e1", [("title", Value::from("t")), ("payload", payload)])
            .unwrap();
        em.flush().await.unwrap();

        let mut fresh = orm.fork();
        match fresh.find_one("Event", &Filter::id("e1")).await.unwrap_err() {
            Error::Hydration { path, .. } => assert_eq!(path.to_string(), "payload.history[0].at"),
            other => panic!("unexpected {:?}", other),
        }
    })
    .await;
}

// ============================================================================
// Tag-shaped user data
// ============================================================================

#[tokio::test]
async fn lookalike_tagged_object_round_trips_as_object() {
    across_backends(|orm| async move {
        let devices = json!({"receipt": {"$type": "datetime", "$value": "not a date"}});
        let mut em = orm.fork();
        create_user(&mut em, "u1", "a@x", Value::from(devices.clone()));
        em.flush().await.unwrap();

        let (_em, user) = load_fresh(&orm, "u1").await;
        assert_eq!(property(&orm, &user, "devices"), cv(devices));
    })
    .await;
}

#[tokio::test]
async fn unknown_tag_preserved_verbatim() {
    across_backends(|orm| async move {
        let devices = json!({"price": {"$type": "money", "$value": "3 EUR"}});
        let mut em = orm.fork();
        create_user(&mut em, "u1", "a@x", Value::from(devices.clone()));
        em.flush().await.unwrap();

        let (_em, user) = load_fresh(&orm, "u1").await;
        assert_eq!(property(&orm, &user, "devices"), cv(devices));
    })
    .await;
}

#[tokio::test]
async fn unknown_tag_payload_keeps_typed_leaves() {
    across_backends(|orm| async move {
        let mut em = orm.fork();
        create_user(&mut em, "u1", "a@x", money_with_leaves());
        em.flush().await.unwrap();

        let (_em, user) = load_fresh(&orm, "u1").await;
        assert_receipt_leaves(&property(&orm, &user, "devices"));
    })
    .await;
}

#[tokio::test]
async fn unknown_tag_payload_survives_nested_update() {
    across_backends(|orm| async move {
        let mut em = orm.fork();
        let user = create_user(&mut em, "u1", "a@x", money_with_leaves());
        em.flush().await.unwrap();

        let later = Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap();
        let devices = user.get("devices").unwrap();
        let price = devices.as_object().unwrap().get("price").unwrap();
        let receipt = price.as_object().unwrap().get("$value").unwrap();
        receipt.as_object().unwrap().set("at", later);
        em.flush().await.unwrap();

        let (_em, reloaded) = load_fresh(&orm, "u1").await;
        let stored = property(&orm, &reloaded, "devices");
        let receipt = stored.get("price").unwrap().get("$value").unwrap();
        assert_eq!(receipt.get("at").unwrap().as_datetime(), Some(&later));
        assert_eq!(receipt.get("serial").unwrap().as_typed(), Some(&TypedLeaf::Uuid(serial())));
    })
    .await;
}

#[tokio::test]
async fn lookalike_inside_unknown_tag_round_trips_as_object() {
    across_backends(|orm| async move {
        let devices = json!({
            "price": {
                "$type": "money",
                "$value": {"stamp": {"$type": "datetime", "$value": "not a date"}}
            }
        });
        let mut em = orm.fork();
        create_user(&mut em, "u1", "a@x", Value::from(devices.clone()));
        em.flush().await.unwrap();

        let (_em, user) = load_fresh(&orm, "u1").await;
        assert_eq!(property(&orm, &user, "devices"), cv(devices));
    })
    .await;
}
