//! JSON import.
//!
//! Accepts the same three shapes the exporter produces: an array of rows, a
//! single row object, or a bare scalar destined for the table's first column.

use cipherstore_domain::{CipherStoreError, ConstraintKind, Result};
use rusqlite::Connection;
use serde_json::{Map, Value};
use tracing::{error, info, instrument, warn};

use super::Marshaller;
use crate::database::data::insert_on;
use crate::database::schema::{table_exists_on, table_info_on, truncate_on};
use crate::database::sql::quote_ident;
use crate::errors::map_sql_error;

impl Marshaller {
    /// Import `data` into `table`, optionally emptying it first.
    ///
    /// The whole import is one transaction: a single failing row leaves the
    /// table exactly as it was.
    #[instrument(skip(self, data), fields(table = %table, clear_first))]
    pub fn import_table_data(&self, table: &str, data: &Value, clear_first: bool) -> bool {
        let result = self.db.with_transaction(|conn| import_table_on(conn, table, data, clear_first));
        match result {
            Ok(rows) => {
                info!(rows, "Table imported");
                true
            }
            Err(e) => {
                error!(error = %e, "Table import rolled back");
                false
            }
        }
    }

    /// Import every table under the document's `tables` key.
    ///
    /// Each table is its own transaction; returns how many succeeded.
    #[instrument(skip(self, document), fields(clear_first))]
    pub fn import_database(&self, document: &Value, clear_first: bool) -> usize {
        let Some(tables) = document.get("tables").and_then(Value::as_object) else {
            error!("Import document has no tables object");
            return 0;
        };

        let imported = tables
            .iter()
            .filter(|(table, data)| self.import_table_data(table, data, clear_first))
            .count();
        info!(imported, total = tables.len(), "Database import finished");
        imported
    }

    /// Insert each element of `rows`, skipping the ones that fail.
    ///
    /// All rows share one transaction; each row runs under its own savepoint
    /// so a failure discards only that row. Returns the inserted count.
    #[instrument(skip(self, rows), fields(table = %table, rows = rows.len()))]
    pub fn batch_insert_from_json_array(&self, table: &str, rows: &[Value]) -> usize {
        let result = self.db.with_transaction(|conn| {
            let first_column = first_column_on(conn, table)?;
            let mut inserted = 0usize;
            for (index, row) in rows.iter().enumerate() {
                conn.execute_batch("SAVEPOINT json_row").map_err(map_sql_error)?;
                match insert_value_on(conn, table, &first_column, row) {
                    Ok(()) => {
                        conn.execute_batch("RELEASE json_row").map_err(map_sql_error)?;
                        inserted += 1;
                    }
                    Err(e) => {
                        warn!(index, error = %e, "Skipping row");
                        conn.execute_batch("ROLLBACK TO json_row; RELEASE json_row")
                            .map_err(map_sql_error)?;
                    }
                }
            }
            Ok(inserted)
        });

        result.unwrap_or_else(|e| {
            error!(error = %e, "Batch insert failed");
            0
        })
    }
}

fn import_table_on(conn: &Connection, table: &str, data: &Value, clear_first: bool) -> Result<usize> {
    if !table_exists_on(conn, table)? {
        return Err(CipherStoreError::constraint(
            ConstraintKind::NoSuchTable,
            format!("no such table: {table}"),
        ));
    }
    if clear_first {
        truncate_on(conn, table)?;
    }

    let first_column = first_column_on(conn, table)?;
    match data {
        Value::Array(rows) => {
            for row in rows {
                insert_value_on(conn, table, &first_column, row)?;
            }
            Ok(rows.len())
        }
        other => {
            insert_value_on(conn, table, &first_column, other)?;
            Ok(1)
        }
    }
}

fn insert_value_on(conn: &Connection, table: &str, first_column: &str, value: &Value) -> Result<()> {
    match value {
        Value::Object(row) => insert_on(conn, table, row).map(|_| ()),
        scalar => {
            let mut row = Map::new();
            row.insert(first_column.to_string(), scalar.clone());
            insert_on(conn, table, &row).map(|_| ())
        }
    }
}

fn first_column_on(conn: &Connection, table: &str) -> Result<String> {
    table_info_on(conn, table)?
        .into_iter()
        .next()
        .map(|column| column.name)
        .ok_or_else(|| {
            CipherStoreError::NotFound(format!("table {} has no columns", quote_ident(table)))
        })
}
