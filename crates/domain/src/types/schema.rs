//! Table and column descriptions
//!
//! [`ColumnInfo`] is what the engine reports about an existing table;
//! [`ColumnDefinition`] and [`SchemaClause`] are what a configured schema
//! string asks for.

use serde::{Deserialize, Serialize};

use crate::impl_domain_str_conversions;

/// One row of `PRAGMA table_info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub cid: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    /// 1-based position in the primary key, 0 when not part of it
    pub pk: i64,
}

impl ColumnInfo {
    pub fn is_primary_key(&self) -> bool {
        self.pk > 0
    }
}

/// A column clause parsed from a schema string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub is_primary_key: bool,
    /// Remaining column constraints, verbatim (UNIQUE, CHECK(...),
    /// REFERENCES ..., COLLATE ...)
    pub constraints: Vec<String>,
}

impl ColumnDefinition {
    /// Render the clause accepted by `ALTER TABLE ... ADD COLUMN`
    ///
    /// SQLite refuses PRIMARY KEY, UNIQUE, foreign-key references and a
    /// NOT NULL without a default on added columns, so those parts are left
    /// out.
    pub fn to_add_column_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.data_type);
        if !self.nullable && self.default_value.is_some() {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default_value {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        for constraint in &self.constraints {
            let upper = constraint.to_uppercase();
            if upper.starts_with("UNIQUE")
                || upper.starts_with("REFERENCES")
                || upper.starts_with("PRIMARY")
            {
                continue;
            }
            sql.push(' ');
            sql.push_str(constraint);
        }
        sql.trim_end().to_string()
    }
}

/// Table-level constraint kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableConstraintKind {
    PrimaryKey,
    ForeignKey,
    Unique,
    Check,
    Other,
}

impl_domain_str_conversions!(TableConstraintKind {
    PrimaryKey => "primary key",
    ForeignKey => "foreign key",
    Unique => "unique",
    Check => "check",
    Other => "other",
});

/// One top-level clause of a schema string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "clause", rename_all = "snake_case")]
pub enum SchemaClause {
    Column(ColumnDefinition),
    TableConstraint { kind: TableConstraintKind, sql: String },
}

impl SchemaClause {
    pub fn is_foreign_key(&self) -> bool {
        matches!(self, Self::TableConstraint { kind: TableConstraintKind::ForeignKey, .. })
    }

    pub fn as_column(&self) -> Option<&ColumnDefinition> {
        match self {
            Self::Column(column) => Some(column),
            Self::TableConstraint { .. } => None,
        }
    }
}

/// A column requested by `batch_add_columns`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: String,
    /// SQL literal appended as `DEFAULT <value>`
    pub default: Option<String>,
    /// Informational only, SQLite has no column comments
    pub comment: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self { name: name.into(), data_type: data_type.into(), default: None, comment: None }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Clause for `ALTER TABLE ... ADD COLUMN`
    pub fn to_add_column_sql(&self) -> String {
        match &self.default {
            Some(default) => format!("{} {} DEFAULT {}", self.name, self.data_type, default),
            None => format!("{} {}", self.name, self.data_type),
        }
    }
}
