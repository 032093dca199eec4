//! Domain constants
//!
//! Defaults and fixed names shared by the configuration and the engines.

// Configuration defaults
pub const DEFAULT_DB_VERSION: u32 = 1;
pub const DEFAULT_POOL_SIZE: u32 = 10;
pub const MAX_POOL_SIZE: u32 = 100;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_DB_EXTENSION: &str = "db";

// Value cache
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

// Numeric lock map
pub const DEFAULT_LOCK_CAPACITY: usize = 1024;

// Database file removal
pub const DELETE_RETRY_ATTEMPTS: u32 = 3;
pub const DELETE_RETRY_DELAY_MS: u64 = 100;
pub const DATABASE_FILE_SUFFIXES: &[&str] = &["", "-wal", "-shm", "-journal"];

// Tables never listed, exported, or dropped in bulk
pub const SYSTEM_TABLE_PREFIX: &str = "sqlite_";
pub const ANDROID_METADATA_TABLE: &str = "android_metadata";

/// Field-name fragments that mark a column as a quantity
pub const QUANTITY_KEYWORDS: &[&str] =
    &["count", "quantity", "value", "amount", "数量", "数值", "值"];
