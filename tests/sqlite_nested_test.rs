//! Integration tests for nested handles on a real SQLite database.
//!
//! Tests verify that:
//! - Rolling back to a savepoint discards only the inner scope's work
//! - Nested scopes without savepoints defer everything to the owner
//! - Queries, named binding and struct scanning work through a handle
//! - Existing sqlx transactions can be wrapped

use db_nested_tx::models::IsolationLevel;
use db_nested_tx::{
    ConnectConfig, DbError, DbPool, DbTransaction, Handle, HandleOption, Query, TxOptions,
};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePoolOptions;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Item {
    id: i64,
    name: String,
    price: Option<f64>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Create a SQLite database file that outlives the returned URL.
fn temp_db_url() -> String {
    let temp_file = NamedTempFile::new().unwrap();
    // Keep the temp file alive - prevent deletion when function returns
    let db_path = temp_file
        .into_temp_path()
        .keep()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    format!("sqlite:{}", db_path)
}

async fn setup(savepoints: bool) -> Handle {
    init_tracing();
    let db = Handle::connect("sqlite", &temp_db_url(), [HandleOption::SavePoint(savepoints)])
        .await
        .unwrap();
    db.execute(
        "CREATE TABLE items (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, price REAL)",
    )
    .await
    .unwrap();
    db
}

async fn insert(handle: &Handle, name: &str) {
    handle
        .execute(Query::new("INSERT INTO items (name) VALUES (?)").bind(name))
        .await
        .unwrap();
}

async fn names(handle: &Handle) -> Vec<String> {
    handle
        .fetch_all_as::<Item>("SELECT id, name, price FROM items ORDER BY id")
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.name)
        .collect()
}

#[tokio::test]
async fn test_savepoint_rollback_discards_only_inner_work() {
    let db = setup(true).await;

    let mut tx = db.begin().await.unwrap();
    insert(&tx, "outer").await;

    let mut discarded = tx.begin().await.unwrap();
    assert!(discarded.savepoint_id().is_some());
    insert(&discarded, "discarded").await;
    discarded.rollback().await.unwrap();

    let mut kept = tx.begin().await.unwrap();
    insert(&kept, "kept").await;
    kept.commit().await.unwrap();

    assert_eq!(names(&tx).await, vec!["outer", "kept"]);
    tx.commit().await.unwrap();

    assert_eq!(names(&db).await, vec!["outer", "kept"]);
    db.close().await;
}

#[tokio::test]
async fn test_root_reads_while_child_transaction_open() {
    let db = setup(true).await;

    let mut tx = db.begin().await.unwrap();
    insert(&tx, "pending").await;

    let seen = tokio::time::timeout(Duration::from_secs(5), names(&db))
        .await
        .expect("root query blocked behind the open transaction");
    assert!(seen.is_empty());

    tx.commit().await.unwrap();
    assert_eq!(names(&db).await, vec!["pending"]);
}

#[tokio::test]
async fn test_nested_rollback_without_savepoints_is_noop() {
    let db = setup(false).await;

    let mut tx = db.begin().await.unwrap();
    insert(&tx, "outer").await;

    let mut inner = tx.begin().await.unwrap();
    assert!(inner.savepoint_id().is_none());
    insert(&inner, "inner").await;
    inner.rollback().await.unwrap();

    tx.commit().await.unwrap();
    assert_eq!(names(&db).await, vec!["outer", "inner"]);
}

#[tokio::test]
async fn test_owner_rollback_discards_everything() {
    let db = setup(true).await;

    let mut tx = db.begin().await.unwrap();
    insert(&tx, "first").await;
    let mut inner = tx.begin().await.unwrap();
    insert(&inner, "second").await;
    inner.commit().await.unwrap();
    tx.rollback().await.unwrap();

    assert!(names(&db).await.is_empty());
}

#[tokio::test]
async fn test_dropped_transaction_rolls_back() {
    let db = setup(true).await;
    {
        let tx = db.begin().await.unwrap();
        insert(&tx, "never committed").await;
    }
    assert!(names(&db).await.is_empty());
}

#[tokio::test]
async fn test_named_binding_and_scanning() {
    let db = setup(false).await;
    let item = Item {
        id: 10,
        name: "lamp".to_string(),
        price: Some(19.5),
    };

    let mut tx = db.begin().await.unwrap();
    let result = tx
        .execute_named(
            "INSERT INTO items (id, name, price) VALUES (:id, :name, :price)",
            &item,
        )
        .await
        .unwrap();
    assert_eq!(result.rows_affected, 1);
    assert_eq!(result.last_insert_id, Some(10));
    tx.commit().await.unwrap();

    let found: Item = db
        .fetch_one_as(Query::new("SELECT id, name, price FROM items WHERE id = ?").bind(10))
        .await
        .unwrap();
    assert_eq!(found, item);

    let missing: Option<Item> = db
        .fetch_optional_as(Query::new("SELECT id, name, price FROM items WHERE id = ?").bind(99))
        .await
        .unwrap();
    assert!(missing.is_none());

    let err = db
        .fetch_one("SELECT id FROM items WHERE id = 99")
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Database(sqlx::Error::RowNotFound)));

    let rows = db
        .fetch_all_named(
            "SELECT name FROM items WHERE name = :name",
            &serde_json::json!({"name": "lamp"}),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "lamp");
}

#[tokio::test]
async fn test_binary_values_are_base64() {
    let db = setup(false).await;
    db.execute("CREATE TABLE blobs (data BLOB)").await.unwrap();
    db.execute(Query::new("INSERT INTO blobs (data) VALUES (?)").bind(b"hello".to_vec()))
        .await
        .unwrap();

    let row = db.fetch_one("SELECT data FROM blobs").await.unwrap();
    assert_eq!(row["data"], "aGVsbG8=");
}

#[tokio::test]
async fn test_prepare_describes_statement() {
    let db = setup(false).await;
    let tx = db.begin().await.unwrap();
    let info = tx.prepare("SELECT id, name FROM items").await.unwrap();
    let columns: Vec<&str> = info.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(columns, vec!["id", "name"]);
}

#[tokio::test]
async fn test_scope_rolls_back_failed_work() {
    let db = setup(true).await;
    let mut tx = db.begin().await.unwrap();
    insert(&tx, "before").await;

    let result = tx
        .scope(|inner| {
            Box::pin(async move {
                inner
                    .execute(Query::new("INSERT INTO items (name) VALUES (?)").bind("inside"))
                    .await?;
                // NOT NULL violation
                inner
                    .execute("INSERT INTO items (name) VALUES (NULL)")
                    .await?;
                Ok::<_, DbError>(())
            })
        })
        .await;
    let err = result.unwrap_err();
    assert!(err.as_database_error().is_some());

    tx.commit().await.unwrap();
    assert_eq!(names(&db).await, vec!["before"]);
}

#[tokio::test]
async fn test_sqlite_rejects_unsupported_begin_options() {
    let db = setup(true).await;

    let err = db
        .begin_with(&TxOptions::new().read_only())
        .await
        .unwrap_err();
    assert!(err.is_incompatible_option());

    let err = db
        .begin_with(&TxOptions::new().with_isolation(IsolationLevel::ReadUncommitted))
        .await
        .unwrap_err();
    assert!(err.is_incompatible_option());
    assert!(!db.in_transaction());

    let mut tx = db
        .begin_with(&TxOptions::new().with_isolation(IsolationLevel::Serializable))
        .await
        .unwrap();
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn test_wrap_existing_transaction() {
    init_tracing();
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("{}?mode=rwc", temp_db_url()))
        .await
        .unwrap();
    sqlx::query("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL, price REAL)")
        .execute(&pool)
        .await
        .unwrap();

    let tx = pool.begin().await.unwrap();
    let mut root = Handle::<DbPool>::from_transaction(
        DbTransaction::from(tx),
        [HandleOption::SavePoint(true)],
    )
    .unwrap();
    insert(&root, "outer").await;

    let mut inner = root.begin().await.unwrap();
    insert(&inner, "inner").await;
    inner.rollback().await.unwrap();
    root.commit().await.unwrap();

    let names: Vec<String> = sqlx::query_scalar("SELECT name FROM items ORDER BY id")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(names, vec!["outer"]);
}

#[tokio::test]
async fn test_connect_with_url_config() {
    init_tracing();
    let config = ConnectConfig::parse(&format!("{}?savepoints=true", temp_db_url())).unwrap();
    let db = Handle::connect_with(&config).await.unwrap();
    assert!(db.savepoints_enabled());
    assert_eq!(db.driver_name(), "sqlite");
    db.close().await;
}

#[tokio::test]
async fn test_connect_unknown_driver_fails() {
    let err = Handle::connect("oracle", "oracle://localhost/db", [])
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Connection { .. }));
}
