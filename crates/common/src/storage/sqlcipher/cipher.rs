//! Keying, key verification and re-keying for SQLCipher connections

use rusqlite::Connection;
use tracing::{debug, error, info};
use zeroize::Zeroizing;

use crate::storage::error::{StorageError, StorageResult};

/// Engine messages that mean the page could not be decrypted with the key
const WRONG_KEY_MARKERS: &[&str] = &[
    "file is not a database",
    "file is encrypted",
    "database disk image is malformed",
    "notadb",
    "authentication failed",
    "unsupported file format",
];

/// SQLCipher 4 key derivation rounds
pub const DEFAULT_KDF_ITER: u32 = 256_000;

/// Check whether an engine error message indicates a wrong key
pub fn is_wrong_key_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    WRONG_KEY_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Passphrase and KDF settings for one database file
#[derive(Clone)]
pub struct SqlCipherConfig {
    key: Zeroizing<String>,
    kdf_iter: u32,
}

impl std::fmt::Debug for SqlCipherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlCipherConfig")
            .field("key", &"<redacted>")
            .field("kdf_iter", &self.kdf_iter)
            .finish()
    }
}

impl SqlCipherConfig {
    /// Settings for `key` with the default derivation rounds
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: Zeroizing::new(key.into()), kdf_iter: DEFAULT_KDF_ITER }
    }

    /// Override the derivation rounds; files must be reopened with the same
    /// value they were created with
    pub fn with_kdf_iter(mut self, rounds: u32) -> Self {
        self.kdf_iter = rounds;
        self
    }

    pub fn kdf_iter(&self) -> u32 {
        self.kdf_iter
    }
}

/// Key a freshly opened connection
///
/// The key pragma must run before anything touches the file. A wrong key
/// is not detected here; call [`verify_encryption`] for that.
///
/// # Errors
/// Returns `Encryption` when a cipher pragma is refused.
pub fn configure_sqlcipher(conn: &Connection, config: &SqlCipherConfig) -> StorageResult<()> {
    conn.pragma_update(None, "key", config.key.as_str()).map_err(|e| {
        error!(error = %e, "SQLCipher key pragma failed");
        if is_wrong_key_message(&e.to_string()) {
            StorageError::WrongKeyOrNotEncrypted
        } else {
            StorageError::Encryption(format!("key: {e}"))
        }
    })?;

    let settings: [(&str, i64); 3] = [
        ("cipher_compatibility", 4),
        ("kdf_iter", i64::from(config.kdf_iter)),
        ("cipher_memory_security", 1),
    ];
    for (pragma, value) in settings {
        conn.pragma_update(None, pragma, value)
            .map_err(|e| StorageError::Encryption(format!("{pragma}: {e}")))?;
    }

    debug!(kdf_iter = config.kdf_iter, "SQLCipher connection keyed");
    Ok(())
}

/// Force a read of the schema page so a wrong key fails now rather than on
/// the first query
///
/// # Errors
/// Returns `WrongKeyOrNotEncrypted` when the page does not decrypt.
pub fn verify_encryption(conn: &Connection) -> StorageResult<()> {
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
        .map(|tables| debug!(tables, "Encryption key verified"))
        .map_err(|e| {
            if is_wrong_key_message(&e.to_string()) {
                error!("Database key rejected");
                StorageError::WrongKeyOrNotEncrypted
            } else {
                StorageError::from(e)
            }
        })
}

/// Re-encrypt the open database under a new key
///
/// The connection must already be keyed with the current key. Other
/// connections to the file keep the old key and must be reopened.
///
/// # Errors
/// Returns `InvalidConfig` for an empty key, `Encryption` if the engine
/// refuses.
pub fn rekey(conn: &Connection, new_key: &str) -> StorageResult<()> {
    if new_key.is_empty() {
        return Err(StorageError::InvalidConfig("new key is empty".into()));
    }

    conn.pragma_update(None, "rekey", new_key).map_err(|e| {
        error!(error = %e, "SQLCipher rekey failed");
        StorageError::Encryption(format!("rekey: {e}"))
    })?;

    info!("Database re-encrypted");
    Ok(())
}
