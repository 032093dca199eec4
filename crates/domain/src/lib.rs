//! # CipherStore Domain
//!
//! Pure types shared by the CipherStore engines.
//!
//! This crate contains:
//! - Database configuration and its builder
//! - The error taxonomy and Result alias
//! - Schema, numeric, property, and maintenance value types
//! - The schema clause parser
//!
//! ## Architecture
//! - No dependencies on other CipherStore crates
//! - No I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;
pub mod utils;

// Re-export commonly used items
pub use config::{DatabaseConfig, DatabaseConfigBuilder};
pub use errors::{CipherStoreError, ConstraintKind, Result};
pub use types::*;
pub use utils::schema_parser::{parse_column_definition, parse_schema, split_top_level};
