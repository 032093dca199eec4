//! Shared harness for the infra integration tests.
//!
//! Every [`TestDatabase`] is an isolated SQLCipher file inside its own
//! temporary directory, removed when the harness drops.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use cipherstore_domain::{DatabaseConfig, DatabaseConfigBuilder};
use cipherstore_infra::database::DbManager;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

pub const TEST_DB_KEY: &str = "test_key_64_chars_long_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

pub const PLAYERS_SCHEMA: &str =
    "id INTEGER PRIMARY KEY, name TEXT NOT NULL, gold INTEGER DEFAULT 0, level INTEGER DEFAULT 1";

/// Temporary database wrapper that keeps the underlying file alive for the
/// duration of a test run.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    temp_dir: TempDir,
}

impl TestDatabase {
    /// Create a new temporary database with default configuration.
    pub fn new() -> Self {
        Self::with_config(|builder| builder)
    }

    /// Create a temporary database after adjusting the configuration.
    pub fn with_config(adjust: impl FnOnce(DatabaseConfigBuilder) -> DatabaseConfigBuilder) -> Self {
        init_tracing();
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let config = adjust(base_config(&temp_dir)).build().expect("test config should validate");
        let manager = DbManager::new(config).expect("db manager should be created");

        Self { manager: Arc::new(manager), temp_dir }
    }

    /// A database with a `players` table holding player 1 with 100 gold.
    pub fn with_players() -> Self {
        let db = Self::with_config(|builder| builder.table_schema("players", PLAYERS_SCHEMA));
        db.execute_batch("INSERT INTO players (id, name, gold) VALUES (1, 'alice', 100)");
        db
    }

    pub fn dir(&self) -> &std::path::Path {
        self.temp_dir.path()
    }

    /// Config pointing at the same file, for opening a second manager.
    pub fn config_with_password(&self, password: &str) -> DatabaseConfig {
        let mut config = self.manager.config();
        config.password = password.to_string();
        config
    }

    /// Execute a batch of SQL statements against the database.
    pub fn execute_batch(&self, sql: &str) {
        self.manager
            .with_connection(|conn| {
                conn.execute_batch(sql).expect("SQL batch execution should succeed");
                Ok(())
            })
            .expect("connection should be available for execute_batch");
    }

    /// First column of the first row of `sql`.
    pub fn query_i64(&self, sql: &str) -> i64 {
        self.manager
            .with_connection(|conn| Ok(conn.query_row(sql, [], |row| row.get(0)).expect("query should succeed")))
            .expect("connection should be available for query_i64")
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a database named `test` inside `dir`.
pub fn base_config(dir: &TempDir) -> DatabaseConfigBuilder {
    DatabaseConfig::builder("test")
        .password(TEST_DB_KEY)
        .directory(dir.path())
        .pool_size(4)
        .auto_optimize(false)
}

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once; filter with `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
