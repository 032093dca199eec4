//! Database configuration
//!
//! One [`DatabaseConfig`] describes one logical encrypted database: its
//! identity (name, password, version), where the file lives, the table
//! schemas reconciled on open, and the pool tuning knobs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_DB_EXTENSION, DEFAULT_DB_VERSION, DEFAULT_POOL_SIZE,
    MAX_POOL_SIZE,
};
use crate::errors::{CipherStoreError, Result};

/// Configuration for one logical database
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Logical name, also the file name
    pub name: String,

    /// Encryption password; may be left out of config files and supplied
    /// through the environment instead
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Schema version recorded in `PRAGMA user_version`
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory holding the database file
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Table name to column-definition list, reconciled when the pool opens
    #[serde(default)]
    pub table_schemas: BTreeMap<String, String>,

    /// Run `PRAGMA optimize` after opening
    #[serde(default = "default_true")]
    pub auto_optimize: bool,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub enable_wal: bool,

    #[serde(default = "default_true")]
    pub enable_foreign_keys: bool,
}

fn default_version() -> u32 {
    DEFAULT_DB_VERSION
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

fn default_pool_size() -> u32 {
    DEFAULT_POOL_SIZE
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("name", &self.name)
            .field("password", &"***")
            .field("version", &self.version)
            .field("directory", &self.directory)
            .field("tables", &self.table_schemas.keys().collect::<Vec<_>>())
            .field("auto_optimize", &self.auto_optimize)
            .field("pool_size", &self.pool_size)
            .finish_non_exhaustive()
    }
}

impl DatabaseConfig {
    /// Start a builder for the named database
    pub fn builder(name: impl Into<String>) -> DatabaseConfigBuilder {
        DatabaseConfigBuilder::new(name)
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns `Config` for an empty name or password, a name containing a
    /// path separator, a zero version, or a pool size outside `1..=100`.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CipherStoreError::Config("database name cannot be empty".to_string()));
        }
        if self.name.contains(['/', '\\']) {
            return Err(CipherStoreError::Config(format!(
                "database name must not contain path separators: {}",
                self.name
            )));
        }
        if self.password.is_empty() {
            return Err(CipherStoreError::Config("database password cannot be empty".to_string()));
        }
        if self.version == 0 {
            return Err(CipherStoreError::Config("version must be at least 1".to_string()));
        }
        if self.pool_size == 0 || self.pool_size > MAX_POOL_SIZE {
            return Err(CipherStoreError::Config(format!(
                "pool_size must be between 1 and {MAX_POOL_SIZE}"
            )));
        }
        if self.busy_timeout_ms == 0 {
            return Err(CipherStoreError::Config(
                "busy_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Full path of the database file
    ///
    /// The name is used verbatim when it already has an extension, otherwise
    /// `.db` is appended.
    pub fn path(&self) -> PathBuf {
        let file = Path::new(&self.name);
        if file.extension().is_some() {
            self.directory.join(file)
        } else {
            self.directory.join(format!("{}.{DEFAULT_DB_EXTENSION}", self.name))
        }
    }

    /// Whether two configurations open the same database with the same key
    /// and version
    pub fn same_identity(&self, other: &Self) -> bool {
        self.name == other.name && self.password == other.password && self.version == other.version
    }
}

/// Builder for [`DatabaseConfig`]
#[derive(Debug)]
pub struct DatabaseConfigBuilder {
    config: DatabaseConfig,
}

impl DatabaseConfigBuilder {
    /// Create a builder with defaults for every optional field
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: DatabaseConfig {
                name: name.into(),
                password: String::new(),
                version: DEFAULT_DB_VERSION,
                directory: default_directory(),
                table_schemas: BTreeMap::new(),
                auto_optimize: true,
                pool_size: DEFAULT_POOL_SIZE,
                busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
                enable_wal: true,
                enable_foreign_keys: true,
            },
        }
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.config.version = version;
        self
    }

    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config.directory = directory.into();
        self
    }

    /// Add or replace one table schema
    pub fn table_schema(mut self, table: impl Into<String>, schema: impl Into<String>) -> Self {
        self.config.table_schemas.insert(table.into(), schema.into());
        self
    }

    pub fn table_schemas(mut self, schemas: BTreeMap<String, String>) -> Self {
        self.config.table_schemas = schemas;
        self
    }

    pub fn auto_optimize(mut self, enabled: bool) -> Self {
        self.config.auto_optimize = enabled;
        self
    }

    pub fn pool_size(mut self, size: u32) -> Self {
        self.config.pool_size = size;
        self
    }

    pub fn busy_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.busy_timeout_ms = timeout_ms;
        self
    }

    pub fn enable_wal(mut self, enabled: bool) -> Self {
        self.config.enable_wal = enabled;
        self
    }

    pub fn enable_foreign_keys(mut self, enabled: bool) -> Self {
        self.config.enable_foreign_keys = enabled;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// See [`DatabaseConfig::validate`].
    pub fn build(self) -> Result<DatabaseConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
