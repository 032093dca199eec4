//! SQLCipher connection pool
//!
//! r2d2 pool of encrypted SQLite connections. Every connection is keyed and
//! configured by the pool's init callback, so callers never see an unkeyed
//! handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::{debug, info, instrument, warn};

use super::cipher::{configure_sqlcipher, is_wrong_key_message, verify_encryption, SqlCipherConfig};
use super::config::SqlCipherPoolConfig;
use super::connection::SqlCipherConnection;
use super::pragmas::apply_connection_pragmas;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::metrics::{HealthStatus, PoolMetrics, StorageMetrics};

/// SQLCipher connection pool
///
/// - Connection pooling (default: 10 connections)
/// - Encryption key applied to every new connection
/// - WAL mode and busy timeout per connection
/// - Wrong keys detected before the pool is built
#[derive(Debug)]
pub struct SqlCipherPool {
    pool: Pool<SqliteConnectionManager>,
    path: PathBuf,
    config: SqlCipherPoolConfig,
    metrics: Arc<StorageMetrics>,
}

impl SqlCipherPool {
    /// Create a new SQLCipher connection pool
    ///
    /// # Process
    /// 1. Open a probe connection and verify the key decrypts the file
    /// 2. Build the r2d2 pool with the key and pragma init callback
    ///
    /// # Errors
    /// Returns `InvalidConfig` for settings that fail validation,
    /// `WrongKeyOrNotEncrypted` when the key does not match the file,
    /// `Connection` when the file cannot be opened or the pool cannot be
    /// built.
    #[instrument(skip(encryption_key, config), fields(db_path = ?path, pool_size = config.max_size))]
    pub fn new(
        path: &Path,
        encryption_key: String,
        config: SqlCipherPoolConfig,
    ) -> StorageResult<Self> {
        info!("Creating SQLCipher connection pool");
        config.validate()?;

        let metrics = Arc::new(StorageMetrics::new(config.max_size));
        let cipher_config = SqlCipherConfig::new(encryption_key);

        {
            let probe = Connection::open(path).map_err(|e| {
                warn!(error = %e, "Failed to open database file");
                StorageError::Connection(format!("Failed to open {}: {e}", path.display()))
            })?;
            configure_sqlcipher(&probe, &cipher_config)?;
            verify_encryption(&probe)?;
            debug!("Encryption verified successfully");
        }

        let pool_config = config.clone();
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            configure_sqlcipher(conn, &cipher_config)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            apply_connection_pragmas(conn, &pool_config)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(config.max_size)
            .min_idle(Some(1))
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .map_err(|e| {
                warn!("Failed to create connection pool: {}", e);
                if is_wrong_key_message(&e.to_string()) {
                    StorageError::WrongKeyOrNotEncrypted
                } else {
                    StorageError::Connection(format!("Failed to create pool: {e}"))
                }
            })?;

        info!("SQLCipher pool created successfully with {} connections", config.max_size);

        Ok(Self { pool, path: path.to_path_buf(), config, metrics })
    }

    /// Get a connection from the pool
    ///
    /// # Errors
    /// Returns `Timeout` when no connection frees up within the configured
    /// timeout, `Connection` for any other pool failure.
    #[instrument(skip(self), fields(pool_size = self.config.max_size))]
    pub fn get_sqlcipher_connection(&self) -> StorageResult<SqlCipherConnection> {
        let start = std::time::Instant::now();

        match self.pool.get() {
            Ok(conn) => {
                let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                self.metrics.record_connection_acquired(duration_ms);
                debug!("Connection acquired in {}ms", duration_ms);
                Ok(SqlCipherConnection::new(conn))
            }
            Err(e) => {
                let err_str = e.to_string().to_lowercase();

                if err_str.contains("timed out") || err_str.contains("timeout") {
                    self.metrics.record_connection_timeout();
                    warn!("Connection timeout after {:?}", self.config.connection_timeout);
                    Err(StorageError::Timeout(self.config.connection_timeout))
                } else {
                    self.metrics.record_connection_error();
                    warn!("Connection error: {}", e);
                    Err(StorageError::Connection(format!("Failed to get connection: {e}")))
                }
            }
        }
    }

    /// Report pool occupancy and whether a connection can be obtained
    pub fn health_check(&self) -> HealthStatus {
        let state = self.pool.state();

        match self.pool.get() {
            Ok(_conn) => HealthStatus::healthy(
                (state.connections - state.idle_connections) as usize,
                state.idle_connections as usize,
                self.config.max_size as usize,
            ),
            Err(e) => HealthStatus::unhealthy(format!("Pool unhealthy: {e}")),
        }
    }

    /// Snapshot of the acquisition counters
    pub fn metrics(&self) -> PoolMetrics {
        self.metrics.snapshot()
    }

    /// Database file backing this pool
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pool configuration
    pub fn config(&self) -> &SqlCipherPoolConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for storage::sqlcipher::pool.
    use tempfile::TempDir;

    use super::*;

    fn test_key() -> String {
        "test_key_64_chars_long_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_string()
    }

    /// Validates `SqlCipherPool::new` and a first query.
    ///
    /// Assertion coverage: ensures the routine completes without panicking.
    #[test]
    fn test_pool_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let pool = SqlCipherPool::new(&db_path, test_key(), SqlCipherPoolConfig::default()).unwrap();
        let conn = pool.get_sqlcipher_connection().unwrap();

        conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY)", []).unwrap();
        assert_eq!(pool.path(), db_path.as_path());
        assert_eq!(pool.metrics().connections_acquired, 1);
    }

    /// Validates concurrent writers through the pool.
    ///
    /// Assertions:
    /// - Confirms `count` equals `5`.
    #[test]
    fn test_concurrent_connections() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let pool = Arc::new(
            SqlCipherPool::new(&db_path, test_key(), SqlCipherPoolConfig::default()).unwrap(),
        );

        {
            let conn = pool.get_sqlcipher_connection().unwrap();
            conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY, value TEXT)", []).unwrap();
        }

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    let conn = pool.get_sqlcipher_connection().unwrap();
                    let value = format!("thread_{i}");
                    conn.execute("INSERT INTO test (value) VALUES (?1)", [&value]).unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let conn = pool.get_sqlcipher_connection().unwrap();
        let count: i32 = conn.query_row("SELECT COUNT(*) FROM test", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 5);
    }

    /// Validates `SqlCipherPool::health_check` on a fresh pool.
    ///
    /// Assertions:
    /// - Ensures `health.healthy` evaluates to true.
    /// - Confirms `health.max_connections` equals `10`.
    #[test]
    fn test_health_check() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let pool = SqlCipherPool::new(&db_path, test_key(), SqlCipherPoolConfig::default()).unwrap();

        let health = pool.health_check();
        assert!(health.healthy);
        assert_eq!(health.max_connections, 10);
    }

    /// Validates a wrong key is rejected before the pool is built.
    ///
    /// Assertions:
    /// - Ensures `matches!(result, Err(StorageError::WrongKeyOrNotEncrypted))`
    ///   evaluates to true.
    #[test]
    fn test_wrong_encryption_key() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        {
            let pool =
                SqlCipherPool::new(&db_path, test_key(), SqlCipherPoolConfig::default()).unwrap();
            let conn = pool.get_sqlcipher_connection().unwrap();
            conn.execute("CREATE TABLE test (id INTEGER)", []).unwrap();
        }

        let result = SqlCipherPool::new(
            &db_path,
            "wrong_key_64_chars_long_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_string(),
            SqlCipherPoolConfig::default(),
        );

        assert!(matches!(result, Err(StorageError::WrongKeyOrNotEncrypted)));
    }
}
