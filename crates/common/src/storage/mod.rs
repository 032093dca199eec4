//! Storage primitives for encrypted databases
//!
//! SQLCipher connection pooling and the storage error type shared by the
//! engines built on top.

pub mod error;
pub mod metrics;
pub mod sqlcipher;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use metrics::{HealthStatus, PoolMetrics, StorageMetrics};
pub use sqlcipher::{
    apply_connection_pragmas, configure_sqlcipher, rekey, verify_encryption, SqlCipherConfig,
    JournalMode, SqlCipherConnection, SqlCipherPool, SqlCipherPoolConfig,
};
