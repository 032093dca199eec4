//! SQLCipher pool settings
//!
//! Sizing for the r2d2 pool plus the pragmas every pooled connection gets
//! once its key is set.

use std::time::Duration;

use crate::storage::error::{StorageError, StorageResult};

/// Upper bound on pooled connections per database file
pub const MAX_POOL_SIZE: u32 = 100;

/// Journal mode applied to each connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    /// Write-ahead log; readers proceed while one writer commits
    Wal,
    /// Rollback journal deleted at the end of each transaction
    Delete,
}

impl JournalMode {
    /// Value passed to `PRAGMA journal_mode`
    pub fn as_pragma(self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
        }
    }
}

/// Settings for one [`SqlCipherPool`](super::SqlCipherPool)
#[derive(Debug, Clone)]
pub struct SqlCipherPoolConfig {
    /// Maximum number of pooled connections
    pub max_size: u32,

    /// How long a caller waits for a free connection
    pub connection_timeout: Duration,

    /// SQLite busy handler timeout per connection
    pub busy_timeout: Duration,

    pub journal_mode: JournalMode,

    /// Pages between automatic WAL checkpoints; ignored outside WAL
    pub wal_autocheckpoint: u32,

    pub foreign_keys: bool,
}

impl Default for SqlCipherPoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            connection_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_millis(5000),
            journal_mode: JournalMode::Wal,
            wal_autocheckpoint: 1000,
            foreign_keys: true,
        }
    }
}

impl SqlCipherPoolConfig {
    /// Upper bound on pooled connections
    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// How long a statement waits on a locked file
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = mode;
        self
    }

    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Check the pool can actually be built with these settings
    ///
    /// # Errors
    /// Returns `InvalidConfig` for an empty or oversized pool and for zero
    /// timeouts.
    pub fn validate(&self) -> StorageResult<()> {
        if self.max_size == 0 || self.max_size > MAX_POOL_SIZE {
            return Err(StorageError::InvalidConfig(format!(
                "max_size must be between 1 and {MAX_POOL_SIZE}, got {}",
                self.max_size
            )));
        }
        if self.connection_timeout.is_zero() {
            return Err(StorageError::InvalidConfig("connection_timeout must be non-zero".into()));
        }
        if self.busy_timeout.is_zero() {
            return Err(StorageError::InvalidConfig("busy_timeout must be non-zero".into()));
        }
        Ok(())
    }
}
