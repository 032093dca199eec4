//! Property facade operation types

use serde::{Deserialize, Serialize};

/// Operation selected by `operate_property`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum PropertyOp {
    Query,
    Increase(i64),
    Decrease(i64),
    Replace(serde_json::Value),
    Exists,
}

/// Result of `operate_property`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", content = "value", rename_all = "snake_case")]
pub enum PropertyResult {
    /// Current (or new) value of the property
    Value(serde_json::Value),
    /// Outcome of a numeric change
    Numeric(super::NumericOutcome),
    /// Whether the record exists
    Exists(bool),
    /// Replace succeeded or failed
    Replaced(bool),
    /// No record or no such field
    Missing,
}
