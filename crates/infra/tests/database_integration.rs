//! End-to-end coverage for the connection manager, registry and schema
//! engine against real SQLCipher files.

mod support;

use std::sync::Arc;
use std::thread;

use cipherstore_domain::{CipherStoreError, ColumnSpec};
use cipherstore_infra::database::{DatabaseRegistry, DbManager, SchemaManager};
use support::{base_config, TestDatabase, PLAYERS_SCHEMA, TEST_DB_KEY};
use tempfile::TempDir;

/// Validates nested acquisition on one thread shares a single handle.
///
/// Assertions:
/// - Confirms both scoped connections point at the same physical handle.
/// - Confirms the reference count rises to 2 and falls back to 0.
#[test]
fn nested_acquisition_shares_one_handle() {
    let db = TestDatabase::new();

    let outer = db.manager.acquire().expect("outer acquisition");
    let inner = db.manager.acquire().expect("inner acquisition");
    assert!(outer.same_handle(&inner));
    assert_eq!(db.manager.ref_count(), 2);

    drop(inner);
    assert_eq!(db.manager.ref_count(), 1);
    outer.release();
    assert_eq!(db.manager.ref_count(), 0);
    assert!(db.manager.is_open(), "releasing handles keeps the pool open");
}

/// Validates each thread gets its own binding.
#[test]
fn threads_hold_independent_bindings() {
    let db = TestDatabase::new();
    let _main = db.manager.acquire().expect("main acquisition");

    let manager = Arc::clone(&db.manager);
    let counts = thread::spawn(move || {
        let first = manager.acquire().expect("worker acquisition");
        let during = manager.ref_count();
        drop(first);
        (during, manager.ref_count())
    })
    .join()
    .expect("worker thread");

    assert_eq!(counts, (1, 0));
    assert_eq!(db.manager.ref_count(), 1);
}

/// Validates `close_all` discards bindings, is idempotent, and the manager
/// reopens on demand.
#[test]
fn close_all_is_idempotent_and_reopens() {
    let db = TestDatabase::with_players();

    let held = db.manager.acquire().expect("acquired");
    db.manager.close_all();
    db.manager.close_all();
    assert!(!db.manager.is_open());
    assert_eq!(db.manager.ref_count(), 0);

    drop(held);
    assert_eq!(db.manager.ref_count(), 0, "stale release is ignored");

    assert_eq!(db.query_i64("SELECT gold FROM players WHERE id = 1"), 100);
    assert!(db.manager.is_open());
}

/// Validates opening with the wrong password fails with `Connection`.
#[test]
fn wrong_password_fails_with_connection_error() {
    let db = TestDatabase::with_players();
    db.manager.close_all();

    let other = DbManager::new(db.config_with_password("not-the-right-key")).expect("config valid");
    let err = other.acquire().expect_err("wrong key must not open");
    assert!(matches!(err, CipherStoreError::Connection(_)), "got {err:?}");
    assert!(!other.is_open());
}

/// Validates the transaction helper commits on success and rolls back on
/// error.
#[test]
fn transactions_commit_or_roll_back() {
    let db = TestDatabase::with_players();

    let failed: cipherstore_domain::Result<()> = db.manager.with_transaction(|conn| {
        conn.execute_batch("UPDATE players SET gold = 0 WHERE id = 1").expect("update runs");
        Err(CipherStoreError::Internal("abort".into()))
    });
    assert!(failed.is_err());
    assert_eq!(db.query_i64("SELECT gold FROM players WHERE id = 1"), 100);

    db.manager
        .with_transaction(|conn| {
            conn.execute_batch("UPDATE players SET gold = 5 WHERE id = 1").expect("update runs");
            Ok(())
        })
        .expect("committed");
    assert_eq!(db.query_i64("SELECT gold FROM players WHERE id = 1"), 5);
}

/// Validates the registry returns one manager per identity.
///
/// Assertions:
/// - Confirms re-registering the same config yields the same `Arc`.
/// - Confirms a new version replaces and closes the old manager.
#[test]
fn registry_keeps_one_manager_per_identity() {
    let dir = TempDir::new().expect("temp dir");
    let registry = DatabaseRegistry::new();

    let first = registry.register(base_config(&dir).build().expect("config")).expect("registered");
    let again = registry.register(base_config(&dir).build().expect("config")).expect("registered");
    assert!(Arc::ptr_eq(&first, &again));

    first.with_connection(|_| Ok(())).expect("opened");
    let bumped = registry
        .register(base_config(&dir).version(2).build().expect("config"))
        .expect("replaced");
    assert!(!Arc::ptr_eq(&first, &bumped));
    assert!(!first.is_open(), "replaced manager is closed");
    assert_eq!(registry.names(), vec!["test".to_string()]);

    assert!(registry.remove("test"));
    assert!(registry.get("test").is_none());
}

/// Validates the open hook reconciles schemas and records the version.
#[test]
fn open_hook_reconciles_schema_and_version() {
    let db = TestDatabase::with_config(|builder| {
        builder.version(3).table_schema("players", PLAYERS_SCHEMA)
    });

    assert_eq!(db.query_i64("PRAGMA user_version"), 3);
    let schema = SchemaManager::new(Arc::clone(&db.manager));
    assert!(schema.table_exists("players"));
    assert!(schema.column_exists("players", "gold"));

    // A later config with an extra column reconciles additively on reopen.
    db.manager.close_all();
    let reopened = DbManager::new(
        base_config_in(db.dir())
            .version(3)
            .table_schema("players", format!("{PLAYERS_SCHEMA}, xp INTEGER DEFAULT 0"))
            .build()
            .expect("config"),
    )
    .expect("manager");
    let schema = SchemaManager::new(Arc::new(reopened));
    assert!(schema.column_exists("players", "xp"));
    assert_eq!(schema.table_structure("players").len(), 5);
}

/// Validates idempotent creation and batch column addition.
///
/// Assertions:
/// - Confirms creating an existing table succeeds without changes.
/// - Confirms an existing column in a batch is skipped while the rest are
///   added.
#[test]
fn schema_creation_is_idempotent_and_batch_skips_existing() {
    let db = TestDatabase::new();
    let schema = SchemaManager::new(Arc::clone(&db.manager));

    assert!(schema.create_table_if_not_exists("items", "id INTEGER PRIMARY KEY, name TEXT"));
    assert!(schema.create_table_if_not_exists("items", "id INTEGER PRIMARY KEY, other BLOB"));
    assert!(!schema.column_exists("items", "other"));

    assert!(schema.add_column_if_not_exists("items", "name", "TEXT"));
    assert!(schema.batch_add_columns(
        "items",
        &[
            ColumnSpec::new("name", "TEXT"),
            ColumnSpec::new("qty", "INTEGER").with_default("0"),
            ColumnSpec::new("note", "TEXT").with_comment("free text"),
        ],
    ));

    let names: Vec<String> =
        schema.table_structure("items").into_iter().map(|column| column.name).collect();
    assert_eq!(names, vec!["id", "name", "qty", "note"]);
}

/// Validates a column type change preserves rows and the primary key.
#[test]
fn change_column_type_preserves_rows() {
    let db = TestDatabase::with_players();
    let schema = SchemaManager::new(Arc::clone(&db.manager));

    assert!(schema.change_column_type("players", "gold", "REAL"));

    let gold = schema
        .table_structure("players")
        .into_iter()
        .find(|column| column.name == "gold")
        .expect("gold column");
    assert_eq!(gold.data_type, "REAL");
    assert_eq!(db.query_i64("SELECT CAST(gold AS INTEGER) FROM players WHERE id = 1"), 100);
    assert!(!schema.change_column_type("players", "missing", "TEXT"));
    assert_eq!(schema.table_names(), vec!["players".to_string()]);
}

/// Validates a retyped parent keeps its children under both delete actions.
///
/// Assertions:
/// - Confirms an `ON DELETE CASCADE` child keeps every row.
/// - Confirms a `NO ACTION` child does not block the rebuild.
/// - Confirms the parent's index survives and enforcement stays on.
#[test]
fn change_column_type_keeps_referencing_rows() {
    let db = TestDatabase::new();
    db.execute_batch(
        "CREATE TABLE guilds (id INTEGER PRIMARY KEY, name TEXT, rank INTEGER);
         CREATE INDEX guilds_rank ON guilds (rank);
         CREATE TABLE members (id INTEGER PRIMARY KEY,
             guild INTEGER REFERENCES guilds(id) ON DELETE CASCADE);
         CREATE TABLE banners (id INTEGER PRIMARY KEY, guild INTEGER REFERENCES guilds(id));
         INSERT INTO guilds VALUES (1, 'north', 3), (2, 'south', 5);
         INSERT INTO members VALUES (1, 1), (2, 1), (3, 2);
         INSERT INTO banners VALUES (1, 2);",
    );
    let schema = SchemaManager::new(Arc::clone(&db.manager));

    assert!(schema.change_column_type("guilds", "rank", "TEXT"));

    assert_eq!(db.query_i64("SELECT COUNT(*) FROM members"), 3);
    assert_eq!(db.query_i64("SELECT COUNT(*) FROM banners"), 1);
    assert_eq!(
        db.query_i64("SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'guilds_rank'"),
        1
    );
    assert_eq!(db.query_i64("PRAGMA foreign_keys"), 1);

    let rank = schema
        .table_structure("guilds")
        .into_iter()
        .find(|column| column.name == "rank")
        .expect("rank column");
    assert_eq!(rank.data_type, "TEXT");

    db.execute_batch("DELETE FROM guilds WHERE id = 1");
    assert_eq!(db.query_i64("SELECT COUNT(*) FROM members"), 1);
}

/// Validates bulk drop/truncate and file deletion.
#[test]
fn bulk_table_operations_and_file_deletion() {
    let db = TestDatabase::with_players();
    let schema = SchemaManager::new(Arc::clone(&db.manager));
    assert!(schema.create_table_if_not_exists("log", "id INTEGER PRIMARY KEY AUTOINCREMENT, msg TEXT"));
    db.execute_batch("INSERT INTO log (msg) VALUES ('a'), ('b')");

    assert_eq!(schema.truncate_all_tables(), 2);
    assert_eq!(db.query_i64("SELECT COUNT(*) FROM players"), 0);

    assert_eq!(schema.drop_all_tables(), 2);
    assert!(schema.table_names().is_empty());

    let path = db.manager.path();
    assert!(path.exists());
    assert!(schema.delete_database_files());
    assert!(!path.exists());
}

fn base_config_in(dir: &std::path::Path) -> cipherstore_domain::DatabaseConfigBuilder {
    cipherstore_domain::DatabaseConfig::builder("test")
        .password(TEST_DB_KEY)
        .directory(dir)
        .pool_size(4)
        .auto_optimize(false)
}
