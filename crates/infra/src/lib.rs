//! # CipherStore Infrastructure
//!
//! Engines for encrypted SQLite databases.
//!
//! This crate contains:
//! - The database registry and per-database connection manager
//! - Schema evolution (idempotent create, additive columns, type rebuilds)
//! - Atomic numeric updates under per-key locks
//! - Generic row operations and the Row/JSON marshaller
//! - The property facade with its encrypted value cache
//! - Maintenance routines and password changes
//! - Configuration loading
//!
//! ## Architecture
//! - Types and errors come from `cipherstore-domain`
//! - Pooling, pragmas, caching and the cipher come from `cipherstore-common`
//! - Contains all the I/O

pub mod config;
pub mod database;
pub mod errors;

// Re-export commonly used items
pub use database::*;
pub use errors::{map_sql_error, map_storage_error, InfraError};
