//! Conversions from external infrastructure errors into domain errors.

use cipherstore_common::error::CommonError;
use cipherstore_common::storage::StorageError;
use cipherstore_domain::{CipherStoreError, ConstraintKind};
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub CipherStoreError);

impl From<InfraError> for CipherStoreError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<CipherStoreError> for InfraError {
    fn from(value: CipherStoreError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoCipherStoreError {
    fn into_cipherstore(self) -> CipherStoreError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → CipherStoreError */
/* -------------------------------------------------------------------------- */

/// Classify an engine message into a constraint kind
///
/// Returns `None` when the message is not a constraint or schema-lookup
/// failure.
pub fn classify_constraint_message(message: &str) -> Option<ConstraintKind> {
    let lower = message.to_ascii_lowercase();
    if lower.contains("no such table") {
        Some(ConstraintKind::NoSuchTable)
    } else if lower.contains("no such column") || lower.contains("has no column named") {
        Some(ConstraintKind::NoSuchColumn)
    } else if lower.contains("not null constraint") {
        Some(ConstraintKind::NotNull)
    } else if lower.contains("unique constraint") {
        Some(ConstraintKind::Unique)
    } else if lower.contains("foreign key constraint") {
        Some(ConstraintKind::ForeignKey)
    } else if lower.contains("check constraint") {
        Some(ConstraintKind::Check)
    } else {
        None
    }
}

impl IntoCipherStoreError for SqlError {
    fn into_cipherstore(self) -> CipherStoreError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_else(|| err.to_string());
                match (err.code, err.extended_code) {
                    (ErrorCode::ConstraintViolation, 2067 | 1555) => {
                        CipherStoreError::constraint(ConstraintKind::Unique, message)
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        CipherStoreError::constraint(ConstraintKind::ForeignKey, message)
                    }
                    (ErrorCode::ConstraintViolation, 1299) => {
                        CipherStoreError::constraint(ConstraintKind::NotNull, message)
                    }
                    (ErrorCode::ConstraintViolation, 275) => {
                        CipherStoreError::constraint(ConstraintKind::Check, message)
                    }
                    (ErrorCode::ConstraintViolation, _) => CipherStoreError::constraint(
                        classify_constraint_message(&message).unwrap_or(ConstraintKind::Other),
                        message,
                    ),
                    (ErrorCode::NotADatabase, _) => CipherStoreError::Connection(
                        "SQLCipher key rejected or database not encrypted".into(),
                    ),
                    (ErrorCode::CannotOpen, _) => {
                        CipherStoreError::Connection(format!("unable to open database: {message}"))
                    }
                    (ErrorCode::DatabaseBusy, _) => {
                        CipherStoreError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        CipherStoreError::Database("database is locked".into())
                    }
                    _ => match classify_constraint_message(&message) {
                        Some(kind) => CipherStoreError::constraint(kind, message),
                        None => CipherStoreError::Database(format!(
                            "sqlite failure {:?} (code {}): {}",
                            err.code, err.extended_code, message
                        )),
                    },
                }
            }
            RE::QueryReturnedNoRows => CipherStoreError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                CipherStoreError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, name, ty) => {
                CipherStoreError::Database(format!("invalid column type for {name}: {ty}"))
            }
            RE::Utf8Error(_) => {
                CipherStoreError::Database("invalid UTF-8 returned from sqlite".into())
            }
            RE::InvalidPath(path) => CipherStoreError::Connection(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            RE::InvalidQuery => CipherStoreError::Database("invalid SQL query".into()),
            // Prepare-time failures (missing table or column) only carry text
            other => {
                let message = other.to_string();
                match classify_constraint_message(&message) {
                    Some(kind) => CipherStoreError::constraint(kind, message),
                    None => CipherStoreError::Database(message),
                }
            }
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_cipherstore())
    }
}

/* -------------------------------------------------------------------------- */
/* StorageError → CipherStoreError */
/* -------------------------------------------------------------------------- */

impl IntoCipherStoreError for StorageError {
    fn into_cipherstore(self) -> CipherStoreError {
        match self {
            StorageError::Rusqlite(err) => err.into_cipherstore(),
            StorageError::WrongKeyOrNotEncrypted => CipherStoreError::Connection(
                "SQLCipher key rejected or database not encrypted".into(),
            ),
            StorageError::InvalidConfig(message) => CipherStoreError::Config(message),
            StorageError::Timeout(waited) => CipherStoreError::Connection(format!(
                "timed out after {waited:?} waiting for a pooled connection"
            )),
            StorageError::Pragma(message) => CipherStoreError::Database(message),
            StorageError::Encryption(message) => CipherStoreError::Crypto(message),
            StorageError::Connection(message) => CipherStoreError::Connection(message),
        }
    }
}

impl From<StorageError> for InfraError {
    fn from(value: StorageError) -> Self {
        InfraError(value.into_cipherstore())
    }
}

/* -------------------------------------------------------------------------- */
/* CommonError → CipherStoreError */
/* -------------------------------------------------------------------------- */

impl IntoCipherStoreError for CommonError {
    fn into_cipherstore(self) -> CipherStoreError {
        match self {
            CommonError::Config { .. } => CipherStoreError::Config(self.to_string()),
            CommonError::Serialization { .. } => CipherStoreError::Marshalling(self.to_string()),
            _ => CipherStoreError::Crypto(self.to_string()),
        }
    }
}

impl From<CommonError> for InfraError {
    fn from(value: CommonError) -> Self {
        InfraError(value.into_cipherstore())
    }
}

/// Map a rusqlite error straight to the domain error
pub fn map_sql_error(err: SqlError) -> CipherStoreError {
    CipherStoreError::from(InfraError::from(err))
}

/// Map a storage error straight to the domain error
pub fn map_storage_error(err: StorageError) -> CipherStoreError {
    CipherStoreError::from(InfraError::from(err))
}

/// Map a shared-primitive error (cipher, cache, config) to the domain error
pub fn map_common_error(err: CommonError) -> CipherStoreError {
    CipherStoreError::from(InfraError::from(err))
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    //! Unit tests for errors::conversions.
    use rusqlite::ffi::{Error as FfiError, ErrorCode};

    use super::*;

    fn failure(code: ErrorCode, extended_code: i32, message: &str) -> SqlError {
        SqlError::SqliteFailure(FfiError { code, extended_code }, Some(message.into()))
    }

    /// Validates extended constraint codes map to their kinds.
    ///
    /// Assertions:
    /// - Confirms 2067, 787, 1299 and 275 map to unique, foreign key, not null
    ///   and check.
    #[test]
    fn constraint_codes_map_to_kinds() {
        let cases = [
            (2067, ConstraintKind::Unique),
            (787, ConstraintKind::ForeignKey),
            (1299, ConstraintKind::NotNull),
            (275, ConstraintKind::Check),
        ];

        for (code, expected) in cases {
            let mapped = map_sql_error(failure(ErrorCode::ConstraintViolation, code, "violated"));
            assert_eq!(mapped.constraint_kind(), Some(expected), "code {code}");
        }
    }

    /// Validates prepare-time messages are classified from their text.
    #[test]
    fn missing_table_message_maps_to_no_such_table() {
        let mapped = map_sql_error(failure(ErrorCode::Unknown, 1, "no such table: players"));
        assert_eq!(mapped.constraint_kind(), Some(ConstraintKind::NoSuchTable));

        let mapped =
            map_sql_error(failure(ErrorCode::Unknown, 1, "table players has no column named xp"));
        assert_eq!(mapped.constraint_kind(), Some(ConstraintKind::NoSuchColumn));
    }

    /// Validates busy maps to a database error rather than a constraint.
    #[test]
    fn sqlite_busy_maps_to_database_error() {
        let mapped = map_sql_error(failure(ErrorCode::DatabaseBusy, 5, "database is locked"));
        match mapped {
            CipherStoreError::Database(msg) => {
                assert!(msg.contains("busy") || msg.contains("locked"));
            }
            other => panic!("expected database error, got {other:?}"),
        }
    }

    /// Validates pool-level failures surface as connection errors.
    #[test]
    fn wrong_key_maps_to_connection() {
        let mapped = map_storage_error(StorageError::WrongKeyOrNotEncrypted);
        assert!(matches!(mapped, CipherStoreError::Connection(_)));

        let mapped = map_storage_error(StorageError::Timeout(std::time::Duration::from_secs(30)));
        assert!(matches!(mapped, CipherStoreError::Connection(msg) if msg.contains("30s")));
    }

    /// Validates no-rows maps to `NotFound`.
    #[test]
    fn no_rows_maps_to_not_found() {
        assert!(matches!(
            map_sql_error(SqlError::QueryReturnedNoRows),
            CipherStoreError::NotFound(_)
        ));
    }
}
