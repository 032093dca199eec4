//! Numeric update types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result of a guarded increment or decrement
///
/// Replaces the legacy integer sentinels; [`as_sentinel`](Self::as_sentinel)
/// still yields them for callers that branch on numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NumericOutcome {
    /// The field now holds this value
    Updated { value: i64 },
    /// No row matched the predicate
    NotFound,
    /// The decrement would have gone below zero; nothing changed
    Insufficient { current: i64, requested: i64 },
    /// The update was rolled back: bad table or column, a non-numeric cell,
    /// overflow, or a predicate matching more than one row
    Failed { reason: String },
}

impl NumericOutcome {
    /// Legacy value for a missing row or a failed update
    pub const NOT_FOUND_SENTINEL: i64 = -1;
    /// Legacy value for a rejected underflow
    pub const INSUFFICIENT_SENTINEL: i64 = -2;

    pub fn updated(value: i64) -> Self {
        Self::Updated { value }
    }

    /// Outcome for an update rolled back by an engine error
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed { reason: reason.into() }
    }

    /// New value, or `-1` / `-2`; failures share `-1` with `NotFound`
    pub fn as_sentinel(&self) -> i64 {
        match self {
            Self::Updated { value } => *value,
            Self::NotFound | Self::Failed { .. } => Self::NOT_FOUND_SENTINEL,
            Self::Insufficient { .. } => Self::INSUFFICIENT_SENTINEL,
        }
    }

    /// New value when the update was applied
    pub fn value(&self) -> Option<i64> {
        match self {
            Self::Updated { value } => Some(*value),
            _ => None,
        }
    }

    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }
}

/// One delta applied by `batch_update`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub table: String,
    pub where_clause: String,
    pub args: Vec<String>,
    pub field: String,
    pub delta: i64,
}

impl FieldUpdate {
    pub fn new(
        table: impl Into<String>,
        where_clause: impl Into<String>,
        args: Vec<String>,
        field: impl Into<String>,
        delta: i64,
    ) -> Self {
        Self {
            table: table.into(),
            where_clause: where_clause.into(),
            args,
            field: field.into(),
            delta,
        }
    }
}

impl fmt::Display for FieldUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({}): {:+}", self.table, self.field, self.where_clause, self.delta)
    }
}

/// Arithmetic applied by `batch_numeric_operations`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum NumericOpKind {
    Increment,
    Decrement { prevent_negative: bool },
    Multiply,
    Divide,
    /// `current * value / 100`
    Percentage,
    Set,
    Max,
    Min,
    Abs,
    Round,
    Ceil,
    Floor,
    Reset,
}

/// One field operation in a numeric batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericOperation {
    pub field: String,
    pub kind: NumericOpKind,
    /// Operand; ignored by the unary kinds
    #[serde(default)]
    pub value: f64,
}

impl NumericOperation {
    pub fn new(field: impl Into<String>, kind: NumericOpKind, value: f64) -> Self {
        Self { field: field.into(), kind, value }
    }

    /// Apply the operation to the current value
    ///
    /// Returns `None` for a division by zero or a prevented negative result.
    pub fn apply(&self, current: f64) -> Option<f64> {
        let result = match self.kind {
            NumericOpKind::Increment => current + self.value,
            NumericOpKind::Decrement { prevent_negative } => {
                let result = current - self.value;
                if prevent_negative && result < 0.0 {
                    return None;
                }
                result
            }
            NumericOpKind::Multiply => current * self.value,
            NumericOpKind::Divide => {
                if self.value == 0.0 {
                    return None;
                }
                current / self.value
            }
            NumericOpKind::Percentage => current * (self.value / 100.0),
            NumericOpKind::Set => self.value,
            NumericOpKind::Max => current.max(self.value),
            NumericOpKind::Min => current.min(self.value),
            NumericOpKind::Abs => current.abs(),
            NumericOpKind::Round => current.round(),
            NumericOpKind::Ceil => current.ceil(),
            NumericOpKind::Floor => current.floor(),
            NumericOpKind::Reset => 0.0,
        };
        result.is_finite().then_some(result)
    }
}

/// Aggregate over one numeric column
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub count: i64,
    pub sum: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}
