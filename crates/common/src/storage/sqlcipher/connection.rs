//! SQLCipher connection wrapper
//!
//! A pooled, already keyed connection. Dereferences to
//! [`rusqlite::Connection`] and returns to the pool when dropped.

use std::ops::{Deref, DerefMut};

use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection as RusqliteConnection;

/// Pooled SQLCipher connection
pub struct SqlCipherConnection {
    inner: PooledConnection<SqliteConnectionManager>,
}

impl std::fmt::Debug for SqlCipherConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlCipherConnection")
            .field("autocommit", &self.inner.is_autocommit())
            .finish()
    }
}

impl SqlCipherConnection {
    /// Wrap a pooled connection
    pub fn new(conn: PooledConnection<SqliteConnectionManager>) -> Self {
        Self { inner: conn }
    }

    /// Get a reference to the underlying rusqlite connection
    pub fn inner(&self) -> &RusqliteConnection {
        &self.inner
    }

    /// Whether a transaction is currently open on this connection
    pub fn in_transaction(&self) -> bool {
        !self.inner.is_autocommit()
    }
}

impl Deref for SqlCipherConnection {
    type Target = RusqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for SqlCipherConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for storage::sqlcipher::connection.
    use tempfile::TempDir;

    use crate::storage::sqlcipher::{SqlCipherPool, SqlCipherPoolConfig};

    fn test_key() -> String {
        "test_key_64_chars_long_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_string()
    }

    /// Validates query helpers reached through `Deref`.
    ///
    /// Assertions:
    /// - Confirms the inserted name reads back as `"Bob"`.
    #[test]
    fn test_connection_query_row() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let pool = SqlCipherPool::new(&db_path, test_key(), SqlCipherPoolConfig::default()).unwrap();
        let conn = pool.get_sqlcipher_connection().unwrap();

        conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT)", []).unwrap();
        conn.execute("INSERT INTO test (name) VALUES (?1)", ["Bob"]).unwrap();

        let result: String =
            conn.query_row("SELECT name FROM test WHERE id = ?1", [1], |row| row.get(0)).unwrap();
        assert_eq!(result, "Bob");
    }

    /// Validates `in_transaction` tracks BEGIN and COMMIT.
    #[test]
    fn test_in_transaction() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let pool = SqlCipherPool::new(&db_path, test_key(), SqlCipherPoolConfig::default()).unwrap();
        let conn = pool.get_sqlcipher_connection().unwrap();

        assert!(!conn.in_transaction());
        conn.execute_batch("BEGIN IMMEDIATE").unwrap();
        assert!(conn.in_transaction());
        conn.execute_batch("COMMIT").unwrap();
        assert!(!conn.in_transaction());
    }
}
