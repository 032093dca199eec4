//! Configuration loader
//!
//! Loads a [`DatabaseConfig`] from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! A password given in `CIPHERSTORE_DB_PASSWORD` always overrides the one in
//! a file, so files can be committed without secrets.
//!
//! ## Environment Variables
//! - `CIPHERSTORE_DB_NAME`: Database name (required)
//! - `CIPHERSTORE_DB_PASSWORD`: Encryption password (required)
//! - `CIPHERSTORE_DB_VERSION`: Schema version
//! - `CIPHERSTORE_DB_DIR`: Directory holding the database file
//! - `CIPHERSTORE_DB_POOL_SIZE`: Connection pool size
//! - `CIPHERSTORE_AUTO_OPTIMIZE`: Run `PRAGMA optimize` on open (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./cipherstore.json` or `./cipherstore.toml` (current working directory)
//! 2. `./config.json` or `./config.toml` (current working directory)
//! 3. The same names in the parent and grandparent directories
//! 4. Relative to executable location

use std::path::{Path, PathBuf};

use cipherstore_domain::{CipherStoreError, DatabaseConfig, Result};

/// Database name; environment overrides apply on top of any config file
pub const ENV_DB_NAME: &str = "CIPHERSTORE_DB_NAME";
/// Passphrase, taking precedence over one stored in a config file
pub const ENV_DB_PASSWORD: &str = "CIPHERSTORE_DB_PASSWORD";
/// Schema version
pub const ENV_DB_VERSION: &str = "CIPHERSTORE_DB_VERSION";
/// Directory holding the database file
pub const ENV_DB_DIR: &str = "CIPHERSTORE_DB_DIR";
/// Connection pool size
pub const ENV_DB_POOL_SIZE: &str = "CIPHERSTORE_DB_POOL_SIZE";
/// `true`/`false` toggle for optimizing on first open
pub const ENV_AUTO_OPTIMIZE: &str = "CIPHERSTORE_AUTO_OPTIMIZE";

const CONFIG_FILE_NAMES: &[&str] =
    &["cipherstore.json", "cipherstore.toml", "config.json", "config.toml"];

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `CipherStoreError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - Required fields are missing
pub fn load() -> Result<DatabaseConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!(db_name = %config.name, "Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// Name and password are required; everything else falls back to the
/// builder defaults.
///
/// # Errors
/// Returns `CipherStoreError::Config` if required variables are missing
/// or have invalid values.
pub fn load_from_env() -> Result<DatabaseConfig> {
    let mut builder = DatabaseConfig::builder(env_var(ENV_DB_NAME)?).password(env_var(ENV_DB_PASSWORD)?);

    if let Some(version) = env_parse::<u32>(ENV_DB_VERSION, "version")? {
        builder = builder.version(version);
    }
    if let Ok(directory) = std::env::var(ENV_DB_DIR) {
        builder = builder.directory(directory);
    }
    if let Some(pool_size) = env_parse::<u32>(ENV_DB_POOL_SIZE, "pool size")? {
        builder = builder.pool_size(pool_size);
    }
    builder = builder.auto_optimize(env_bool(ENV_AUTO_OPTIMIZE, true));

    builder.build()
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `CipherStoreError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - The resulting configuration fails validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<DatabaseConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(CipherStoreError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            CipherStoreError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| CipherStoreError::Config(format!("Failed to read config file: {e}")))?;

    let mut config = parse_config(&contents, &config_path)?;
    if let Ok(password) = std::env::var(ENV_DB_PASSWORD) {
        config.password = password;
    }
    config.validate()?;
    Ok(config)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<DatabaseConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| CipherStoreError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| CipherStoreError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(CipherStoreError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// Searches the working directory, its parent and grandparent, then the
/// executable's directory and its parent, for each of
/// `cipherstore.{json,toml}` and `config.{json,toml}`.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.extend([exe_dir.to_path_buf(), exe_dir.join("..")]);
        }
    }

    candidate_paths(&roots).into_iter().find(|path| path.exists())
}

fn candidate_paths(roots: &[PathBuf]) -> Vec<PathBuf> {
    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .collect()
}

/// Get required environment variable
///
/// # Errors
/// Returns `CipherStoreError::Config` if the variable is not set.
fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        CipherStoreError::Config(format!("Missing required environment variable: {key}"))
    })
}

/// Parse an optional numeric environment variable
fn env_parse<T: std::str::FromStr>(key: &str, what: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| CipherStoreError::Config(format!("Invalid {what}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
