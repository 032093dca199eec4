//! Per-connection pragmas
//!
//! Applied by the pool's init callback right after the key is set.

use rusqlite::Connection;
use tracing::warn;

use super::config::{JournalMode, SqlCipherPoolConfig};
use crate::storage::error::{StorageError, StorageResult};

fn rejected(pragma: &str, err: rusqlite::Error) -> StorageError {
    StorageError::Pragma(format!("{pragma}: {err}"))
}

/// Configure one freshly keyed connection
///
/// Returns the journal mode the engine actually settled on; in-memory and
/// read-only files may refuse WAL.
///
/// # Errors
/// Returns `Pragma` naming the first pragma the connection refused.
pub fn apply_connection_pragmas(
    conn: &Connection,
    config: &SqlCipherPoolConfig,
) -> StorageResult<String> {
    conn.busy_timeout(config.busy_timeout).map_err(|e| rejected("busy_timeout", e))?;

    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", config.journal_mode.as_pragma(), |row| {
            row.get(0)
        })
        .map_err(|e| rejected("journal_mode", e))?;
    if !mode.eq_ignore_ascii_case(config.journal_mode.as_pragma()) {
        warn!(requested = config.journal_mode.as_pragma(), actual = %mode, "journal mode not applied");
    }

    if config.journal_mode == JournalMode::Wal {
        conn.pragma_update(None, "wal_autocheckpoint", config.wal_autocheckpoint)
            .map_err(|e| rejected("wal_autocheckpoint", e))?;
    }
    conn.pragma_update(None, "synchronous", "NORMAL").map_err(|e| rejected("synchronous", e))?;
    conn.pragma_update(None, "foreign_keys", config.foreign_keys)
        .map_err(|e| rejected("foreign_keys", e))?;

    Ok(mode.to_ascii_lowercase())
}
