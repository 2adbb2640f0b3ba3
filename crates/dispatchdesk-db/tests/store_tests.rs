// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use dispatchdesk_app::{
    ColumnLayout, PersonalizationBackend, PersonalizationDocument, PersonalizationStore, SaveMode,
    ScopeKey,
};
use dispatchdesk_db::{Store, validate_db_path};
use dispatchdesk_testkit::{scope, temp_db_path, trip_columns};

fn order(keys: &[&str]) -> PersonalizationDocument {
    PersonalizationDocument {
        column_order: Some(keys.iter().map(|key| (*key).to_owned()).collect()),
        ..PersonalizationDocument::default()
    }
}

#[test]
fn validate_db_path_rejects_uri_forms() {
    assert!(validate_db_path("").is_err());
    assert!(validate_db_path("file:test.db").is_err());
    assert!(validate_db_path("https://example.com/db.sqlite").is_err());
    assert!(validate_db_path("db.sqlite?mode=ro").is_err());
    assert!(validate_db_path(":memory:").is_ok());
    assert!(validate_db_path("/tmp/dispatchdesk.db").is_ok());
}

#[test]
fn bootstrap_is_idempotent() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    store.bootstrap()?;
    assert_eq!(store.load(&scope("grid"))?, None);
    Ok(())
}

#[test]
fn bootstrap_rejects_schema_missing_required_column() -> Result<()> {
    let store = Store::open_memory()?;
    store.raw_connection().execute_batch(
        "
        CREATE TABLE personalization (
          user TEXT NOT NULL,
          screen TEXT NOT NULL,
          component TEXT NOT NULL,
          document TEXT NOT NULL,
          PRIMARY KEY (user, screen, component)
        );
        ",
    )?;

    let err = store
        .bootstrap()
        .expect_err("schema validation should fail");
    let message = err.to_string();
    assert!(message.contains("table `personalization` is missing required columns"));
    assert!(message.contains("created_at"));
    assert!(message.contains("updated_at"));
    Ok(())
}

#[test]
fn bootstrap_rejects_foreign_database() -> Result<()> {
    let store = Store::open_memory()?;
    store
        .raw_connection()
        .execute_batch("CREATE TABLE projects (id INTEGER PRIMARY KEY);")?;
    let err = store
        .bootstrap()
        .expect_err("unrelated database should be rejected");
    assert!(
        err.to_string()
            .contains("missing required table `personalization`")
    );
    Ok(())
}

#[test]
fn saves_store_the_document_whatever_the_mode() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    let key = scope("grid");

    store.save(&key, &order(&["rate"]), SaveMode::Update)?;
    assert_eq!(store.load(&key)?, Some(order(&["rate"])));

    store.save(&key, &order(&["status"]), SaveMode::Insert)?;
    assert_eq!(store.load(&key)?, Some(order(&["status"])));

    store.save(&key, &order(&["status", "rate"]), SaveMode::Update)?;
    assert_eq!(store.load(&key)?, Some(order(&["status", "rate"])));
    assert_eq!(store.list_personalization(&key.user)?.len(), 1);
    Ok(())
}

#[test]
fn stored_empty_document_does_not_block_later_layout_saves() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    let mut personalization = PersonalizationStore::new(store);
    let key = scope("grid");

    assert_eq!(
        personalization.persist(&key, PersonalizationDocument::default())?,
        SaveMode::Insert
    );
    personalization.invalidate(&key);

    let mode = personalization.persist(&key, order(&["customer"]))?;
    assert_eq!(mode, SaveMode::Insert);
    personalization.invalidate(&key);
    assert_eq!(personalization.load(&key), Some(order(&["customer"])));

    assert_eq!(
        personalization.persist(&key, order(&["rate", "customer"]))?,
        SaveMode::Update
    );
    assert_eq!(
        personalization.backend().load(&key)?,
        Some(order(&["rate", "customer"]))
    );
    Ok(())
}

#[test]
fn documents_survive_reopen() -> Result<()> {
    let (_dir, path) = temp_db_path()?;
    let key = scope("grid");
    {
        let store = Store::open(&path)?;
        store.bootstrap()?;
        store.put_personalization(&key, &order(&["customer", "rate"]))?;
    }

    let reopened = Store::open(&path)?;
    reopened.bootstrap()?;
    assert_eq!(reopened.load(&key)?, Some(order(&["customer", "rate"])));
    Ok(())
}

#[test]
fn scopes_are_isolated_and_listed_in_order() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    store.put_personalization(&ScopeKey::new("ana", "trips", "grid"), &order(&["rate"]))?;
    store.put_personalization(&ScopeKey::new("ana", "bills", "form"), &order(&["amount"]))?;
    store.put_personalization(&ScopeKey::new("ben", "trips", "grid"), &order(&["status"]))?;

    let listed = store.list_personalization("ana")?;
    let scopes: Vec<String> = listed.iter().map(|stored| stored.scope.to_string()).collect();
    assert_eq!(scopes, vec!["ana/bills/form", "ana/trips/grid"]);

    assert!(store.delete_personalization(&ScopeKey::new("ana", "trips", "grid"))?);
    assert!(!store.delete_personalization(&ScopeKey::new("ana", "trips", "grid"))?);
    assert_eq!(
        store.load(&ScopeKey::new("ben", "trips", "grid"))?,
        Some(order(&["status"]))
    );
    Ok(())
}

#[test]
fn personalization_store_round_trips_layout_through_sqlite() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    let mut personalization = PersonalizationStore::new(store);
    let key = scope("grid");
    let columns = trip_columns();

    let mut layout = ColumnLayout::resolve(&columns, personalization.load(&key).as_ref());
    assert!(layout.move_column("rate", -1));
    assert!(layout.hide("destination"));
    let document = layout.to_document(personalization.cached(&key));
    assert_eq!(personalization.persist(&key, document)?, SaveMode::Insert);

    layout.show_all();
    let document = layout.to_document(personalization.cached(&key));
    assert_eq!(personalization.persist(&key, document)?, SaveMode::Update);

    let stored = personalization
        .backend()
        .get_personalization(&key)?
        .expect("layout persisted");
    let restored = ColumnLayout::resolve(&columns, Some(&stored.document));
    assert!(!restored.is_hidden("destination"));
    assert_eq!(restored.visible(), layout.visible());
    Ok(())
}
