//! Connection manager for one logical encrypted database.
//!
//! Each [`DbManager`] owns a lazily opened [`SqlCipherPool`] and a map of
//! per-thread bindings. A thread that acquires while it already holds a
//! binding gets the same pooled handle back with the reference count bumped;
//! the handle returns to the pool once the outermost [`ScopedConnection`] is
//! released.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use cipherstore_common::storage::{
    JournalMode, SqlCipherConnection, SqlCipherPool, SqlCipherPoolConfig,
};
use cipherstore_domain::{CipherStoreError, DatabaseConfig, Result};
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard, RwLock};
use tracing::{debug, error, info, instrument, warn};

use super::schema;
use crate::errors::{map_sql_error, map_storage_error};

/// Seconds to wait for a pooled connection before giving up
const POOL_CONNECTION_TIMEOUT_SECS: u64 = 30;

type SharedConnection = Arc<ReentrantMutex<SqlCipherConnection>>;

struct Binding {
    conn: SharedConnection,
    count: usize,
    generation: u64,
}

/// Database manager that wraps an [`SqlCipherPool`].
pub struct DbManager {
    config: RwLock<DatabaseConfig>,
    pool: RwLock<Option<Arc<SqlCipherPool>>>,
    open_lock: Mutex<()>,
    bindings: Mutex<HashMap<ThreadId, Binding>>,
    generation: AtomicU64,
}

impl std::fmt::Debug for DbManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbManager")
            .field("name", &self.config.read().name)
            .field("open", &self.is_open())
            .field("bindings", &self.bindings.lock().len())
            .finish()
    }
}

impl DbManager {
    /// Create a manager for `config`; nothing is opened until the first
    /// acquisition.
    ///
    /// # Errors
    /// Returns `Config` when the configuration does not validate.
    pub fn new(config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(config),
            pool: RwLock::new(None),
            open_lock: Mutex::new(()),
            bindings: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        })
    }

    /// Snapshot of the configuration
    pub fn config(&self) -> DatabaseConfig {
        self.config.read().clone()
    }

    /// Logical database name
    pub fn name(&self) -> String {
        self.config.read().name.clone()
    }

    /// Path of the database file
    pub fn path(&self) -> PathBuf {
        self.config.read().path()
    }

    /// Whether the pool is currently open
    pub fn is_open(&self) -> bool {
        self.pool.read().is_some()
    }

    /// Reference count of the calling thread's binding, 0 when unbound
    pub fn ref_count(&self) -> usize {
        self.bindings.lock().get(&thread::current().id()).map_or(0, |binding| binding.count)
    }

    /// Acquire the calling thread's connection.
    ///
    /// Reuses the thread's live binding when there is one, otherwise takes a
    /// fresh handle from the pool, opening the pool first if needed.
    ///
    /// # Errors
    /// Returns `Connection` when the database cannot be opened (wrong
    /// password, corrupt file, unreachable directory) or no pooled
    /// connection frees up in time.
    pub fn acquire(&self) -> Result<ScopedConnection<'_>> {
        let thread_id = thread::current().id();

        if let Some(binding) = self.bindings.lock().get_mut(&thread_id) {
            binding.count += 1;
            debug!(db_name = %self.name(), count = binding.count, "Reusing thread connection");
            return Ok(ScopedConnection::new(self, Arc::clone(&binding.conn), binding.generation));
        }

        let pool = self.ensure_pool()?;
        let conn = pool.get_sqlcipher_connection().map_err(map_storage_error)?;
        let conn = Arc::new(ReentrantMutex::new(conn));
        let generation = self.generation.load(Ordering::Acquire);

        self.bindings
            .lock()
            .insert(thread_id, Binding { conn: Arc::clone(&conn), count: 1, generation });
        debug!(db_name = %self.name(), "Bound new connection to thread");

        Ok(ScopedConnection::new(self, conn, generation))
    }

    /// Run `f` with the calling thread's connection, releasing it on every
    /// exit path.
    ///
    /// # Errors
    /// Returns the acquisition error or whatever `f` returns.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&SqlCipherConnection) -> Result<T>,
    {
        let scoped = self.acquire()?;
        let conn = scoped.lock();
        f(&conn)
    }

    /// Run `f` inside `BEGIN IMMEDIATE` / `COMMIT`.
    ///
    /// An error from `f` rolls the transaction back and is returned. When the
    /// thread's connection is already inside a transaction, `f` joins it and
    /// the outer caller decides the outcome.
    ///
    /// # Errors
    /// Returns the acquisition error, the engine error from begin/commit, or
    /// the error returned by `f`.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&SqlCipherConnection) -> Result<T>,
    {
        let scoped = self.acquire()?;
        let conn = scoped.lock();

        if conn.in_transaction() {
            return f(&conn);
        }

        conn.execute_batch("BEGIN IMMEDIATE").map_err(map_sql_error)?;

        let outcome = f(&conn).and_then(|value| {
            conn.execute_batch("COMMIT").map_err(map_sql_error)?;
            Ok(value)
        });

        if let Err(err) = &outcome {
            error!(db_name = %self.name(), error = %err, "Transaction failed, rolling back");
            if conn.in_transaction() {
                if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                    warn!(error = %rollback_err, "Rollback failed");
                }
            }
        }

        outcome
    }

    /// Drop every binding and the pool regardless of reference counts.
    ///
    /// Outstanding [`ScopedConnection`]s stay usable until dropped, but their
    /// releases are ignored. Calling this on a closed manager is a no-op.
    #[instrument(skip(self), fields(db_name = %self.name()))]
    pub fn close_all(&self) {
        let _open = self.open_lock.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);

        let dropped = {
            let mut bindings = self.bindings.lock();
            let dropped = bindings.len();
            bindings.clear();
            dropped
        };
        let was_open = self.pool.write().take().is_some();

        if was_open || dropped > 0 {
            info!(bindings = dropped, "Closed database handles");
        }
    }

    /// Swap the stored password after a successful rekey.
    pub(crate) fn set_password(&self, password: String) {
        self.config.write().password = password;
    }

    fn release(&self, generation: u64) {
        let thread_id = thread::current().id();
        let mut bindings = self.bindings.lock();

        let Some(binding) = bindings.get_mut(&thread_id) else {
            return;
        };
        if binding.generation != generation {
            debug!("Ignoring release from a closed generation");
            return;
        }

        if binding.count <= 1 {
            bindings.remove(&thread_id);
            debug!("Returned thread connection to the pool");
        } else {
            binding.count -= 1;
            debug!(count = binding.count, "Released nested connection");
        }
    }

    fn ensure_pool(&self) -> Result<Arc<SqlCipherPool>> {
        if let Some(pool) = self.pool.read().as_ref() {
            return Ok(Arc::clone(pool));
        }

        let _open = self.open_lock.lock();
        if let Some(pool) = self.pool.read().as_ref() {
            return Ok(Arc::clone(pool));
        }

        let config = self.config();
        let pool = Arc::new(open_pool(&config)?);

        // The pool is only published once the open hook succeeded, so a
        // failure here drops it before the error propagates.
        run_open_hook(&pool, &config)?;

        *self.pool.write() = Some(Arc::clone(&pool));
        Ok(pool)
    }
}

impl Drop for DbManager {
    fn drop(&mut self) {
        self.close_all();
    }
}

/// A thread's scoped hold on its database connection.
///
/// Dropping it (or calling [`release`](Self::release)) decrements the
/// thread's reference count. Not `Send`: the binding belongs to the thread
/// that acquired it.
pub struct ScopedConnection<'a> {
    manager: &'a DbManager,
    conn: SharedConnection,
    generation: u64,
    _not_send: PhantomData<*const ()>,
}

impl std::fmt::Debug for ScopedConnection<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedConnection").field("generation", &self.generation).finish()
    }
}

impl<'a> ScopedConnection<'a> {
    fn new(manager: &'a DbManager, conn: SharedConnection, generation: u64) -> Self {
        Self { manager, conn, generation, _not_send: PhantomData }
    }

    /// Borrow the connection
    pub fn lock(&self) -> ReentrantMutexGuard<'_, SqlCipherConnection> {
        self.conn.lock()
    }

    /// Whether two scoped connections share one physical handle
    pub fn same_handle(&self, other: &ScopedConnection<'_>) -> bool {
        Arc::ptr_eq(&self.conn, &other.conn)
    }

    /// Release explicitly; equivalent to dropping
    pub fn release(self) {}
}

impl Drop for ScopedConnection<'_> {
    fn drop(&mut self) {
        self.manager.release(self.generation);
    }
}

fn open_pool(config: &DatabaseConfig) -> Result<SqlCipherPool> {
    if !config.directory.as_os_str().is_empty() {
        std::fs::create_dir_all(&config.directory).map_err(|e| {
            CipherStoreError::Connection(format!(
                "cannot create database directory {}: {e}",
                config.directory.display()
            ))
        })?;
    }

    let journal_mode = if config.enable_wal { JournalMode::Wal } else { JournalMode::Delete };
    let pool_config = SqlCipherPoolConfig::default()
        .with_max_size(config.pool_size)
        .with_connection_timeout(Duration::from_secs(POOL_CONNECTION_TIMEOUT_SECS))
        .with_busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .with_journal_mode(journal_mode)
        .with_foreign_keys(config.enable_foreign_keys);
    pool_config.validate().map_err(map_storage_error)?;

    let path = config.path();
    let pool = SqlCipherPool::new(&path, config.password.clone(), pool_config).map_err(|e| {
        error!(db_name = %config.name, error = %e, "Failed to open database");
        CipherStoreError::Connection(format!("failed to open {}: {e}", config.name))
    })?;

    info!(
        db_name = %config.name,
        db_path = %path.display(),
        max_connections = config.pool_size,
        "SQLCipher pool initialised"
    );
    Ok(pool)
}

/// Schema reconciliation, version stamp and optimize on first open
fn run_open_hook(pool: &SqlCipherPool, config: &DatabaseConfig) -> Result<()> {
    let conn = pool.get_sqlcipher_connection().map_err(map_storage_error)?;

    schema::reconcile_on(&conn, &config.table_schemas);

    let current: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| CipherStoreError::Connection(format!("cannot read user_version: {e}")))?;
    if current < i64::from(config.version) {
        conn.execute_batch(&format!("PRAGMA user_version = {}", config.version))
            .map_err(|e| CipherStoreError::Connection(format!("cannot set user_version: {e}")))?;
        info!(db_name = %config.name, from = current, to = config.version, "Recorded schema version");
    }

    if config.auto_optimize {
        if let Err(e) = conn.execute_batch("PRAGMA optimize") {
            warn!(db_name = %config.name, error = %e, "PRAGMA optimize failed");
        }
    }

    Ok(())
}
