//! Domain types and models

pub mod maintenance;
pub mod numeric;
pub mod property;
pub mod schema;

pub use maintenance::{DatabaseHealth, DatabaseSize};
pub use numeric::{FieldUpdate, NumericOpKind, NumericOperation, NumericOutcome, NumericStats};
pub use property::{PropertyOp, PropertyResult};
pub use schema::{ColumnDefinition, ColumnInfo, ColumnSpec, SchemaClause, TableConstraintKind};
