//! Schema bootstrap and configuration-driven opening

use tempfile::TempDir;

use crate::common::*;

#[tokio::test]
async fn refresh_schema_drops_rows() {
    across_backends(|orm| async move {
        let mut em = orm.fork();
        create_user(&mut em, "u1", "a@x", Value::Null);
        em.flush().await.unwrap();

        orm.refresh_schema().unwrap();

        let mut fresh = orm.fork();
        assert!(fresh.find("User", &Filter::all()).await.unwrap().is_empty());

        // unique index was rebuilt too
        create_user(&mut fresh, "u1", "a@x", Value::Null);
        fresh.flush().await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn relational_file_survives_reopen() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("orm.toml");
    std::fs::write(
        &config_path,
        format!(
            "backend = \"relational\"\npath = {:?}\n",
            dir.path().join("orm.db").display().to_string()
        ),
    )
    .unwrap();

    {
        let config = OrmConfig::from_file(&config_path).unwrap();
        let orm = Orm::open(config, registry()).unwrap();
        let mut em = orm.fork();
        create_user(&mut em, "u1", "a@x", Value::from(json!({"a": [1, 2]})));
        em.flush().await.unwrap();
    }

    let config = OrmConfig::from_file(&config_path).unwrap();
    let orm = Orm::open(config, registry()).unwrap();
    let (_em, user) = load_fresh(&orm, "u1").await;
    assert_eq!(property(&orm, &user, "devices"), cv(json!({"a": [1, 2]})));
}

#[tokio::test]
async fn unknown_entity_and_property_rejected() {
    across_backends(|orm| async move {
        let mut em = orm.fork();
        assert!(matches!(
            em.find("Order", &Filter::all()).await,
            Err(Error::InvalidInput { .. })
        ));
        assert!(matches!(
            em.find("User", &Filter::eq("nickname", "x")).await,
            Err(Error::InvalidInput { .. })
        ));
        assert!(matches!(
            em.find("User", &Filter::eq("devices", "x")).await,
            Err(Error::InvalidInput { .. })
        ));
    })
    .await;
}

#[test]
fn invalid_config_rejected() {
    let err = OrmConfig::from_toml_str("backend = \"cassandra\"").unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}
