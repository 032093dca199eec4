//! Database maintenance: vacuum, reindex, statistics, health, and rekey.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use cipherstore_common::storage::rekey;
use cipherstore_domain::{CipherStoreError, DatabaseHealth, DatabaseSize, Result};
use rusqlite::types::Value;
use rusqlite::Connection;
use tracing::{debug, error, info, instrument, warn};

use super::manager::DbManager;
use super::schema::table_names_on;
use super::sql::quote_ident;
use crate::errors::{map_sql_error, map_storage_error};

/// Page cache applied by [`Maintenance::optimize`] (about 40 MB at 4 KiB pages)
const OPTIMIZE_CACHE_PAGES: i64 = 10_000;

/// Maintenance routines for one database
#[derive(Debug, Clone)]
pub struct Maintenance {
    db: Arc<DbManager>,
}

impl Maintenance {
    /// Maintenance over `db`
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Rebuild the database file, reclaiming free pages
    #[instrument(skip(self), fields(db_name = %self.db.name()))]
    pub fn vacuum(&self) -> bool {
        let started = Instant::now();
        let result = self.db.with_connection(|conn| conn.execute_batch("VACUUM").map_err(map_sql_error));
        match result {
            Ok(()) => {
                info!(elapsed_ms = started.elapsed().as_millis(), "Vacuum complete");
                true
            }
            Err(e) => {
                error!(error = %e, "Vacuum failed");
                false
            }
        }
    }

    /// `REINDEX` every user table; false when any table failed
    #[instrument(skip(self), fields(db_name = %self.db.name()))]
    pub fn reindex_all(&self) -> bool {
        let result = self.db.with_connection(|conn| {
            let mut all_ok = true;
            for table in table_names_on(conn)? {
                match conn.execute_batch(&format!("REINDEX {}", quote_ident(&table))) {
                    Ok(()) => debug!(table = %table, "Reindexed"),
                    Err(e) => {
                        warn!(table = %table, error = %e, "Reindex failed");
                        all_ok = false;
                    }
                }
            }
            Ok(all_ok)
        });
        result.unwrap_or_else(|e| {
            error!(error = %e, "Reindex failed");
            false
        })
    }

    /// Refresh the query planner statistics
    #[instrument(skip(self), fields(db_name = %self.db.name()))]
    pub fn analyze(&self) -> bool {
        let result = self.db.with_connection(|conn| conn.execute_batch("ANALYZE").map_err(map_sql_error));
        match result {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Analyze failed");
                false
            }
        }
    }

    /// Tune the current connection and run `PRAGMA optimize`.
    ///
    /// Switches to WAL when the configuration asks for it and raises the
    /// page cache. Every step runs; the result is false when any failed.
    #[instrument(skip(self), fields(db_name = %self.db.name()))]
    pub fn optimize(&self) -> bool {
        let enable_wal = self.db.config().enable_wal;
        let result = self.db.with_connection(|conn| {
            let mut all_ok = true;

            if enable_wal {
                match conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                    row.get::<_, String>(0)
                }) {
                    Ok(mode) => debug!(journal_mode = %mode, "Journal mode set"),
                    Err(e) => {
                        warn!(error = %e, "Failed to enable WAL");
                        all_ok = false;
                    }
                }
            }

            if let Err(e) = conn.pragma_update(None, "cache_size", OPTIMIZE_CACHE_PAGES) {
                warn!(error = %e, "Failed to set cache size");
                all_ok = false;
            }

            if let Err(e) = conn.execute_batch("PRAGMA optimize") {
                warn!(error = %e, "PRAGMA optimize failed");
                all_ok = false;
            }

            Ok(all_ok)
        });

        let optimized = result.unwrap_or_else(|e| {
            error!(error = %e, "Optimize failed");
            false
        });
        if optimized {
            info!("Database optimized");
        }
        optimized
    }

    /// Messages from `PRAGMA integrity_check`; `["ok"]` for a sound file
    #[instrument(skip(self), fields(db_name = %self.db.name()))]
    pub fn integrity_check(&self) -> Result<Vec<String>> {
        self.db.with_connection(|conn| integrity_messages_on(conn))
    }

    /// Page counts of the database file
    pub fn database_size(&self) -> Result<DatabaseSize> {
        self.db.with_connection(|conn| database_size_on(conn))
    }

    /// Integrity, vacuum mode, size and per-table row counts in one report
    #[instrument(skip(self), fields(db_name = %self.db.name()))]
    pub fn health_check(&self) -> Result<DatabaseHealth> {
        let health = self.db.with_connection(|conn| {
            let messages = integrity_messages_on(conn)?;
            let integrity_ok = messages.len() == 1 && messages[0].eq_ignore_ascii_case("ok");
            let auto_vacuum: Value =
                conn.pragma_query_value(None, "auto_vacuum", |row| row.get(0)).map_err(map_sql_error)?;
            let auto_vacuum = pragma_integer("auto_vacuum", &auto_vacuum)?;
            let journal_mode: String =
                conn.pragma_query_value(None, "journal_mode", |row| row.get(0)).map_err(map_sql_error)?;

            let mut table_row_counts = BTreeMap::new();
            for table in table_names_on(conn)? {
                let count: i64 = conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", quote_ident(&table)), [], |row| {
                        row.get(0)
                    })
                    .map_err(map_sql_error)?;
                table_row_counts.insert(table, count);
            }

            Ok(DatabaseHealth {
                integrity_ok,
                integrity_messages: if integrity_ok { Vec::new() } else { messages },
                auto_vacuum,
                journal_mode,
                size: database_size_on(conn)?,
                table_row_counts,
            })
        })?;

        if health.integrity_ok {
            info!(tables = health.table_row_counts.len(), "Health check passed");
        } else {
            warn!(problems = health.integrity_messages.len(), "Integrity check reported problems");
        }
        Ok(health)
    }

    /// Re-encrypt the database under `new_password`.
    ///
    /// On success the pool is closed so that every later handle opens with
    /// the new key; handles still held keep working until released.
    #[instrument(skip(self, new_password), fields(db_name = %self.db.name()))]
    pub fn change_password(&self, new_password: &str) -> bool {
        let result = self.db.with_connection(|conn| {
            if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE)") {
                debug!(error = %e, "Checkpoint before rekey skipped");
            }
            rekey(conn, new_password).map_err(map_storage_error)
        });

        match result {
            Ok(()) => {
                self.db.set_password(new_password.to_string());
                self.db.close_all();
                info!("Database password changed");
                true
            }
            Err(e) => {
                error!(error = %e, "Password change failed");
                false
            }
        }
    }
}

fn integrity_messages_on(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA integrity_check").map_err(map_sql_error)?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0)).map_err(map_sql_error)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(map_sql_error)
}

/// Keyed connections answer `page_size` with a TEXT `cipher_page_size`
/// column, so every size pragma is read loosely.
fn database_size_on(conn: &Connection) -> Result<DatabaseSize> {
    let pragma = |name: &str| -> Result<i64> {
        let value: Value =
            conn.pragma_query_value(None, name, |row| row.get(0)).map_err(map_sql_error)?;
        pragma_integer(name, &value)
    };
    Ok(DatabaseSize {
        page_count: pragma("page_count")?,
        page_size: pragma("page_size")?,
        freelist_count: pragma("freelist_count")?,
    })
}

fn pragma_integer(name: &str, value: &Value) -> Result<i64> {
    match value {
        Value::Integer(n) => Ok(*n),
        Value::Text(text) => text.trim().parse().map_err(|_| {
            CipherStoreError::Database(format!("PRAGMA {name} returned non-numeric {text:?}"))
        }),
        other => Err(CipherStoreError::Database(format!(
            "PRAGMA {name} returned unexpected {:?}",
            other.data_type()
        ))),
    }
}
