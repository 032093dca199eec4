//! Row/JSON marshalling
//!
//! Table and database exports (in memory or streamed to a writer) and the
//! matching imports.

pub mod convert;
pub mod export;
pub mod import;

use std::sync::Arc;

pub use convert::{cell_to_json, collapse_rows, json_to_row, json_to_sql, row_to_json};
pub use export::{escape_json_string, ExportProgressListener, NoopProgress};

use super::manager::DbManager;

/// JSON exporter and importer for one database
#[derive(Debug, Clone)]
pub struct Marshaller {
    db: Arc<DbManager>,
}

impl Marshaller {
    /// Marshaller reading and writing through `db`
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}
