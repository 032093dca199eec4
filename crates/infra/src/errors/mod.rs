//! Infrastructure error mapping

pub mod conversions;

pub use conversions::{classify_constraint_message, map_common_error, map_sql_error, map_storage_error, InfraError};
