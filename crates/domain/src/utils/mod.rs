//! Pure parsing helpers

pub mod schema_parser;
