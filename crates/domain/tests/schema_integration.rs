//! Integration tests for schema parsing and configuration types
//!
//! Covers the schema strings a game-style application actually declares and
//! the serialized forms of the public value types.

use std::str::FromStr;

use cipherstore_domain::{
    parse_schema, CipherStoreError, ConstraintKind, DatabaseConfig, NumericOutcome, SchemaClause,
    TableConstraintKind,
};

// ============================================================================
// Schema Parsing
// ============================================================================

/// Test a realistic schema with every clause shape
///
/// Scenario: a guild member table with composite keys, quoted defaults and
/// table-level constraints
#[test]
fn test_parse_realistic_schema() {
    let clauses = parse_schema(
        "id INTEGER PRIMARY KEY AUTOINCREMENT, \
         \"display name\" TEXT NOT NULL DEFAULT 'new, player', \
         balance DECIMAL(12, 2) DEFAULT 0 CHECK (balance >= 0), \
         guild_id INTEGER REFERENCES guilds(id) ON DELETE CASCADE, \
         joined_at TEXT, \
         CONSTRAINT uq_name UNIQUE (guild_id, \"display name\"), \
         FOREIGN KEY (guild_id) REFERENCES guilds(id)",
    );

    assert_eq!(clauses.len(), 7);

    let columns: Vec<_> = clauses.iter().filter_map(SchemaClause::as_column).collect();
    assert_eq!(columns.len(), 5);

    let id = columns[0];
    assert!(id.is_primary_key);
    assert_eq!(id.constraints, vec!["PRIMARY KEY AUTOINCREMENT".to_string()]);

    let name = columns[1];
    assert_eq!(name.name, "display name");
    assert!(!name.nullable);
    assert_eq!(name.default_value.as_deref(), Some("'new, player'"));

    let balance = columns[2];
    assert_eq!(balance.data_type, "DECIMAL(12, 2)");
    assert_eq!(balance.default_value.as_deref(), Some("0"));

    assert!(matches!(
        &clauses[5],
        SchemaClause::TableConstraint { kind: TableConstraintKind::Unique, .. }
    ));
    assert!(clauses[6].is_foreign_key());
}

/// Test added-column rendering drops what `ADD COLUMN` cannot carry
#[test]
fn test_add_column_sql_for_reconciliation() {
    let clauses = parse_schema(
        "code TEXT UNIQUE, level INTEGER NOT NULL DEFAULT 1, owner INTEGER REFERENCES owners(id), note TEXT NOT NULL",
    );
    let rendered: Vec<String> = clauses
        .iter()
        .filter_map(SchemaClause::as_column)
        .map(|column| column.to_add_column_sql())
        .collect();

    assert_eq!(
        rendered,
        vec![
            "code TEXT".to_string(),
            "level INTEGER NOT NULL DEFAULT 1".to_string(),
            "owner INTEGER".to_string(),
            "note TEXT".to_string(),
        ]
    );
}

// ============================================================================
// Configuration
// ============================================================================

/// Test the password never appears in serialized or debug output
#[test]
fn test_config_hides_password() {
    let config = DatabaseConfig::builder("vault")
        .password("hunter2")
        .table_schema("kv", "key TEXT PRIMARY KEY, value TEXT")
        .build()
        .expect("valid config");

    let json = serde_json::to_string(&config).expect("serialized");
    assert!(!json.contains("hunter2"));
    assert!(!format!("{config:?}").contains("hunter2"));

    let restored: DatabaseConfig = serde_json::from_str(&json).expect("deserialized");
    assert_eq!(restored.name, "vault");
    assert!(restored.password.is_empty());
    assert!(restored.validate().is_err(), "restored config needs its password again");
}

/// Test identity ignores tuning knobs but not the key or version
#[test]
fn test_config_identity() {
    let base = DatabaseConfig::builder("game").password("k").build().expect("valid");
    let tuned = DatabaseConfig::builder("game").password("k").pool_size(2).build().expect("valid");
    let bumped = DatabaseConfig::builder("game").password("k").version(2).build().expect("valid");

    assert!(base.same_identity(&tuned));
    assert!(!base.same_identity(&bumped));
    assert!(DatabaseConfig::builder("a/b").password("k").build().is_err());
}

// ============================================================================
// Serialized Forms
// ============================================================================

/// Test outcome and error JSON shapes used by callers across process
/// boundaries
#[test]
fn test_serialized_forms() {
    let outcome = serde_json::to_value(NumericOutcome::Insufficient { current: 100, requested: 150 })
        .expect("serialized");
    assert_eq!(outcome["status"], "insufficient");
    assert_eq!(outcome["current"], 100);

    let err = CipherStoreError::constraint(ConstraintKind::Unique, "players.id");
    let json = serde_json::to_value(&err).expect("serialized");
    assert_eq!(json["type"], "Constraint");
    assert_eq!(json["details"]["kind"], "unique");

    assert_eq!(ConstraintKind::from_str("NOT_NULL"), Ok(ConstraintKind::NotNull));
    assert_eq!(TableConstraintKind::ForeignKey.to_string(), "foreign key");
}
