//! Storage error types
//!
//! Failures raised while opening, keying, or borrowing from a SQLCipher
//! pool. Classified through [`ErrorClassification`] so callers can decide
//! whether to retry.

use std::time::Duration;

use thiserror::Error;

use crate::error::{ErrorClassification, ErrorSeverity};

/// Failure of the encrypted storage layer
#[derive(Debug, Error)]
pub enum StorageError {
    /// The file could not be opened or the pool could not be built
    #[error("cannot connect to database: {0}")]
    Connection(String),

    /// A per-connection pragma was refused
    #[error("pragma rejected: {0}")]
    Pragma(String),

    /// Keying or re-keying failed
    #[error("encryption failure: {0}")]
    Encryption(String),

    /// The key does not decrypt the file, or the file is plaintext
    #[error("key rejected or database not encrypted")]
    WrongKeyOrNotEncrypted,

    /// No pooled connection became free in time
    #[error("no pooled connection available after {0:?}")]
    Timeout(Duration),

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Rusqlite(#[from] rusqlite::Error),
}

/// Storage result type
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// SQLite busy or locked, the only engine codes worth another attempt
    fn is_contention(&self) -> bool {
        matches!(
            self,
            Self::Rusqlite(err) if matches!(
                err.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
            )
        )
    }
}

impl ErrorClassification for StorageError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_)) || self.is_contention()
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Encryption(_) | Self::WrongKeyOrNotEncrypted => ErrorSeverity::Critical,
            Self::Timeout(_) => ErrorSeverity::Warning,
            Self::Rusqlite(_) if self.is_contention() => ErrorSeverity::Warning,
            Self::Connection(_) | Self::Pragma(_) | Self::InvalidConfig(_) | Self::Rusqlite(_) => {
                ErrorSeverity::Error
            }
        }
    }

    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    fn retry_after(&self) -> Option<Duration> {
        self.is_retryable().then(|| Duration::from_millis(50))
    }
}

impl From<StorageError> for crate::CommonError {
    fn from(err: StorageError) -> Self {
        crate::CommonError::storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for storage::error.
    use super::*;

    fn busy() -> StorageError {
        StorageError::Rusqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        ))
    }

    /// Validates the messages shown for key and timeout failures.
    ///
    /// Assertions:
    /// - Confirms the wrong-key message never mentions the key itself.
    /// - Confirms the timeout message carries the waited duration.
    #[test]
    fn test_error_display() {
        assert_eq!(
            StorageError::WrongKeyOrNotEncrypted.to_string(),
            "key rejected or database not encrypted"
        );
        assert_eq!(
            StorageError::Timeout(Duration::from_secs(30)).to_string(),
            "no pooled connection available after 30s"
        );
    }

    /// Validates which failures are worth retrying.
    ///
    /// Assertions:
    /// - Confirms pool timeouts and SQLITE_BUSY are retryable with a delay.
    /// - Confirms key and configuration failures are not.
    #[test]
    fn test_retry_semantics() {
        assert!(StorageError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(busy().is_retryable());
        assert_eq!(busy().retry_after(), Some(Duration::from_millis(50)));

        assert!(!StorageError::WrongKeyOrNotEncrypted.is_retryable());
        assert!(!StorageError::InvalidConfig("max_size".into()).is_retryable());
        assert_eq!(StorageError::Pragma("journal_mode".into()).retry_after(), None);
    }

    /// Validates severity levels.
    ///
    /// Assertions:
    /// - Confirms key failures are critical.
    /// - Confirms contention is a warning and a broken file is an error.
    #[test]
    fn test_severity() {
        assert!(StorageError::WrongKeyOrNotEncrypted.is_critical());
        assert_eq!(StorageError::Encryption("rekey".into()).severity(), ErrorSeverity::Critical);
        assert_eq!(busy().severity(), ErrorSeverity::Warning);
        assert_eq!(StorageError::Connection("missing".into()).severity(), ErrorSeverity::Error);
        assert!(!StorageError::Timeout(Duration::from_secs(1)).is_critical());
    }

    /// Validates conversion into the shared error type keeps the message.
    #[test]
    fn test_into_common_error() {
        let common: crate::CommonError = StorageError::Pragma("foreign_keys".into()).into();
        assert!(common.to_string().contains("foreign_keys"));
    }
}
