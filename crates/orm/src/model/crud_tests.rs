//! Record persistence scenarios against the fake driver

use std::sync::Arc;

use crate::backends::fake::{row, FakeDriver};
use crate::cache::MemoryCache;
use crate::connection::{Connection, ConnectionConfig};
use crate::error::OrmError;
use crate::model::{ModelDef, Record};
use crate::value::DbValue;

fn connect(driver: &FakeDriver) -> Connection {
    Connection::with_cache(
        ConnectionConfig::new("fake://primary"),
        Arc::new(driver.clone()),
        Arc::new(MemoryCache::new()),
    )
}

fn doc_def() -> Arc<ModelDef> {
    Arc::new(
        ModelDef::new(
            "Document",
            "documents",
            ["id", "title", "views", "version"],
            vec!["id".to_string()],
        )
        .with_auto_increment("id")
        .with_version_column("version"),
    )
}

fn plain_def() -> Arc<ModelDef> {
    Arc::new(
        ModelDef::new("Note", "notes", ["id", "body"], vec!["id".to_string()])
            .with_auto_increment("id"),
    )
}

fn loaded_doc(id: i64, version: i64) -> Record {
    Record::from_row(
        doc_def(),
        &row(
            &["id", "title", "views", "version"],
            vec![
                DbValue::Int64(id),
                DbValue::String("draft".into()),
                DbValue::Int64(10),
                DbValue::Int64(version),
            ],
        ),
    )
}

#[tokio::test]
async fn test_insert_fills_auto_increment_key() {
    let driver = FakeDriver::new();
    let conn = connect(&driver);

    let mut note = Record::new(plain_def());
    note.set_attribute("body", "hello").unwrap();
    note.insert(&conn).await.unwrap();

    assert!(!note.is_new_record());
    assert_eq!(note.get_attribute("id"), Some(&DbValue::Int64(1)));
    let executed = driver.executed_sql();
    assert_eq!(executed.len(), 1);
    assert!(executed[0].starts_with("INSERT INTO \"notes\""));
    assert!(executed[0].contains("\"body\""));
}

#[tokio::test]
async fn test_insert_initializes_lock_version() {
    let driver = FakeDriver::new();
    let conn = connect(&driver);

    let mut doc = Record::new(doc_def());
    doc.set_attribute("title", "fresh").unwrap();
    doc.insert(&conn).await.unwrap();

    assert_eq!(doc.get_attribute("version"), Some(&DbValue::Int64(0)));
}

#[tokio::test]
async fn test_insert_on_stored_record_rejected() {
    let driver = FakeDriver::new();
    let conn = connect(&driver);
    let mut doc = loaded_doc(1, 0);
    assert!(matches!(
        doc.insert(&conn).await,
        Err(OrmError::InvalidKey(_))
    ));
}

#[tokio::test]
async fn test_update_writes_only_dirty_attributes() {
    let driver = FakeDriver::new();
    let conn = connect(&driver);

    let mut doc = loaded_doc(1, 3);
    doc.set_attribute("title", "published").unwrap();
    let rows = doc.update(&conn).await.unwrap();
    assert_eq!(rows, 1);

    let executed = driver.executed_sql();
    assert_eq!(executed.len(), 1);
    assert!(executed[0].contains("\"title\""));
    assert!(!executed[0].contains("\"views\""));
    // compare-and-swap on the baseline version
    assert!(executed[0].contains("\"version\""));
}

#[tokio::test]
async fn test_update_with_nothing_dirty_issues_no_statement() {
    let driver = FakeDriver::new();
    let conn = connect(&driver);

    let mut doc = loaded_doc(1, 0);
    let rows = doc.update(&conn).await.unwrap();
    assert_eq!(rows, 0);
    assert!(driver.executed_sql().is_empty());
}

#[tokio::test]
async fn test_optimistic_lock_increments_version_by_one() {
    let driver = FakeDriver::new();
    let conn = connect(&driver);

    let mut doc = loaded_doc(1, 3);
    doc.set_attribute("title", "v2").unwrap();
    doc.update(&conn).await.unwrap();

    assert_eq!(doc.get_attribute("version"), Some(&DbValue::Int64(4)));
    // the new baseline reflects the bump, so a second update starts clean
    assert!(doc.dirty_attributes(None).is_empty());
}

#[tokio::test]
async fn test_stale_update_raises_stale_object() {
    let driver = FakeDriver::new();
    let conn = connect(&driver);

    let mut doc = loaded_doc(1, 3);
    doc.set_attribute("title", "conflict").unwrap();
    driver.push_affected(0);
    let err = doc.update(&conn).await.unwrap_err();
    assert!(matches!(err, OrmError::StaleObject(_)));
}

#[tokio::test]
async fn test_stale_delete_raises_stale_object() {
    let driver = FakeDriver::new();
    let conn = connect(&driver);

    let mut doc = loaded_doc(1, 3);
    driver.push_affected(0);
    let err = doc.delete(&conn).await.unwrap_err();
    assert!(matches!(err, OrmError::StaleObject(_)));
}

#[tokio::test]
async fn test_delete_clears_baseline() {
    let driver = FakeDriver::new();
    let conn = connect(&driver);

    let mut doc = loaded_doc(1, 0);
    let rows = doc.delete(&conn).await.unwrap();
    assert_eq!(rows, 1);
    assert!(doc.is_new_record());
    let executed = driver.executed_sql();
    assert!(executed[0].starts_with("DELETE FROM \"documents\""));
}

#[tokio::test]
async fn test_update_keyed_by_old_primary_key() {
    let driver = FakeDriver::new();
    let conn = connect(&driver);

    let mut note = Record::from_row(
        plain_def(),
        &row(&["id", "body"], vec![DbValue::Int64(7), DbValue::String("x".into())]),
    );
    note.set_attribute("id", 8).unwrap();
    note.update(&conn).await.unwrap();

    // the WHERE addresses the stored row (id = 7), not the new value
    let executed = driver.executed_sql();
    assert!(executed[0].contains("WHERE \"id\""));
    assert_eq!(
        note.old_attribute("id"),
        Some(&DbValue::Int32(8)),
        "baseline adopts the new key after a successful update"
    );
}

#[tokio::test]
async fn test_save_routes_between_insert_and_update() {
    let driver = FakeDriver::new();
    let conn = connect(&driver);

    let mut note = Record::new(plain_def());
    note.set_attribute("body", "first").unwrap();
    assert_eq!(note.save(&conn).await.unwrap(), 1);
    assert!(driver.executed_sql()[0].starts_with("INSERT"));

    note.set_attribute("body", "second").unwrap();
    note.save(&conn).await.unwrap();
    assert!(driver.executed_sql()[1].starts_with("UPDATE"));
}

#[tokio::test]
async fn test_update_counters_adjusts_value_and_baseline() {
    let driver = FakeDriver::new();
    let conn = connect(&driver);

    let mut doc = loaded_doc(1, 0);
    let updated = doc.update_counters(&conn, &[("views", 3)]).await.unwrap();
    assert!(updated);

    let executed = driver.executed_sql();
    assert!(executed[0].contains("\"views\" = \"views\" + (3)"));
    assert_eq!(doc.get_attribute("views"), Some(&DbValue::Int64(13)));
    // counters bypass dirty tracking entirely
    assert!(doc.dirty_attributes(None).is_empty());
}

#[tokio::test]
async fn test_update_counters_with_negative_delta() {
    let driver = FakeDriver::new();
    let conn = connect(&driver);

    let mut doc = loaded_doc(1, 0);
    doc.update_counters(&conn, &[("views", -4)]).await.unwrap();
    assert_eq!(doc.get_attribute("views"), Some(&DbValue::Int64(6)));
}

#[tokio::test]
async fn test_refresh_reloads_row() {
    let driver = FakeDriver::new();
    let conn = connect(&driver);

    let mut doc = loaded_doc(1, 0);
    doc.set_attribute("title", "local change").unwrap();
    driver.push_rows(vec![row(
        &["id", "title", "views", "version"],
        vec![
            DbValue::Int64(1),
            DbValue::String("stored".into()),
            DbValue::Int64(99),
            DbValue::Int64(2),
        ],
    )]);

    assert!(doc.refresh(&conn).await.unwrap());
    assert_eq!(doc.get_attribute("title"), Some(&DbValue::String("stored".into())));
    assert!(doc.dirty_attributes(None).is_empty());
}

#[tokio::test]
async fn test_refresh_returns_false_for_missing_row() {
    let driver = FakeDriver::new();
    let conn = connect(&driver);

    let mut doc = loaded_doc(1, 0);
    driver.push_rows(vec![]);
    assert!(!doc.refresh(&conn).await.unwrap());
}
