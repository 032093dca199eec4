//! Error types used throughout CipherStore

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::impl_domain_str_conversions;

/// Kind of constraint the engine rejected a statement with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    NoSuchTable,
    NoSuchColumn,
    NotNull,
    Unique,
    ForeignKey,
    Check,
    Other,
}

impl_domain_str_conversions!(ConstraintKind {
    NoSuchTable => "no_such_table",
    NoSuchColumn => "no_such_column",
    NotNull => "not_null",
    Unique => "unique",
    ForeignKey => "foreign_key",
    Check => "check",
    Other => "other",
});

/// Main error type for CipherStore
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum CipherStoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Constraint violation ({kind}): {message}")]
    Constraint { kind: ConstraintKind, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient {field}: current {current}, requested {requested}")]
    Underflow { field: String, current: i64, requested: i64 },

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Marshalling error: {0}")]
    Marshalling(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CipherStoreError {
    /// Build a constraint error
    pub fn constraint(kind: ConstraintKind, message: impl Into<String>) -> Self {
        Self::Constraint { kind, message: message.into() }
    }

    /// Constraint kind, if this is a constraint error
    pub fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self {
            Self::Constraint { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CipherStoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Marshalling(err.to_string())
    }
}

/// Result type alias for CipherStore operations
pub type Result<T> = std::result::Result<T, CipherStoreError>;

#[cfg(test)]
mod tests {
    //! Unit tests for errors.
    use super::*;

    /// Validates the tagged serde form of struct variants.
    ///
    /// Assertions:
    /// - Confirms the JSON carries `type` and `details`.
    /// - Confirms the value survives a serde round trip.
    #[test]
    fn test_constraint_serializes_tagged() {
        let err = CipherStoreError::constraint(ConstraintKind::Unique, "players.name");
        let json = serde_json::to_value(&err).unwrap();

        assert_eq!(json["type"], "Constraint");
        assert_eq!(json["details"]["kind"], "unique");
        assert_eq!(serde_json::from_value::<CipherStoreError>(json).unwrap(), err);
    }

    /// Validates display strings for the tagged variants.
    #[test]
    fn test_display() {
        let err = CipherStoreError::Underflow { field: "gold".into(), current: 30, requested: 50 };
        assert_eq!(err.to_string(), "Insufficient gold: current 30, requested 50");

        let err = CipherStoreError::constraint(ConstraintKind::NoSuchTable, "no such table: x");
        assert_eq!(err.to_string(), "Constraint violation (no_such_table): no such table: x");
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::NoSuchTable));
    }
}
