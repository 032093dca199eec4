//! Table and database export.
//!
//! [`Marshaller::export_database`] builds the whole document in memory;
//! [`Marshaller::export_database_streaming`] writes the same document row by
//! row to any [`Write`] sink.

use std::io::Write;

use chrono::Utc;
use cipherstore_domain::{CipherStoreError, Result};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::{Map, Number, Value};
use tracing::{debug, info, instrument, warn};

use super::convert::{collapse_rows, row_to_json};
use super::Marshaller;
use crate::database::schema::table_names_on;
use crate::database::sql::quote_ident;
use crate::errors::map_sql_error;

/// Progress callbacks for the streaming exporter
pub trait ExportProgressListener {
    fn on_table_start(&mut self, _table: &str) {}

    fn on_table_size_determined(&mut self, _table: &str, _rows: usize) {}

    fn on_row_processed(&mut self, _table: &str, _processed: usize, _total: usize) {}

    fn on_table_complete(&mut self, _table: &str, _rows: usize) {}

    fn on_export_complete(&mut self, _tables: usize) {}
}

/// Listener that ignores every callback
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ExportProgressListener for NoopProgress {}

impl Marshaller {
    /// Export one table, collapsed by shape.
    ///
    /// # Errors
    /// Returns the engine error for a missing table or failed read.
    #[instrument(skip(self), fields(table = %table))]
    pub fn export_table(&self, table: &str) -> Result<Value> {
        self.db.with_connection(|conn| export_table_on(conn, table))
    }

    /// Export every user table with database metadata.
    ///
    /// # Errors
    /// Returns the first table read failure.
    #[instrument(skip(self))]
    pub fn export_database(&self) -> Result<Value> {
        let name = self.db.name();
        let tables = self.db.with_connection(|conn| {
            within_snapshot(conn, || {
                let mut tables = Map::new();
                for table in table_names_on(conn)? {
                    let value = export_table_on(conn, &table)?;
                    tables.insert(table, value);
                }
                Ok(tables)
            })
        })?;

        let table_count = tables.len();
        let mut document = Map::new();
        document.insert("database_name".into(), Value::String(name));
        document.insert("export_time".into(), Value::String(Utc::now().to_rfc3339()));
        document.insert("table_count".into(), Value::from(table_count));
        document.insert("tables".into(), Value::Object(tables));
        info!(tables = table_count, "Database exported");
        Ok(Value::Object(document))
    }

    /// Pretty-printed [`export_table`](Self::export_table)
    pub fn export_table_to_string(&self, table: &str) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export_table(table)?)?)
    }

    /// Pretty-printed [`export_database`](Self::export_database)
    pub fn export_database_to_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export_database()?)?)
    }

    /// Write the database export to `sink` without building it in memory.
    ///
    /// Returns the number of exported tables.
    ///
    /// # Errors
    /// Returns `Marshalling` when the sink fails and the engine error when a
    /// read fails. Output already written stays in the sink.
    #[instrument(skip(self, sink, listener))]
    pub fn export_database_streaming<W, L>(&self, sink: &mut W, listener: &mut L) -> Result<usize>
    where
        W: Write,
        L: ExportProgressListener + ?Sized,
    {
        let name = self.db.name();
        let count = self.db.with_connection(|conn| {
            within_snapshot(conn, || {
                let tables = table_names_on(conn)?;

                write_raw(sink, "{\"database_name\":")?;
                write_json_string(sink, &name)?;
                write_raw(sink, ",\"export_time\":")?;
                write_json_string(sink, &Utc::now().to_rfc3339())?;
                write_raw(sink, &format!(",\"table_count\":{},\"tables\":{{", tables.len()))?;

                for (index, table) in tables.iter().enumerate() {
                    if index > 0 {
                        write_raw(sink, ",")?;
                    }
                    write_json_string(sink, table)?;
                    write_raw(sink, ":")?;
                    stream_table(conn, table, sink, listener)?;
                }

                write_raw(sink, "}}")?;
                Ok(tables.len())
            })
        })?;

        sink.flush().map_err(sink_error)?;
        listener.on_export_complete(count);
        info!(tables = count, "Streaming export finished");
        Ok(count)
    }
}

/// Run `read` inside one deferred read transaction so row counts and rows
/// come from the same snapshot. Joins a transaction that is already open.
fn within_snapshot<T>(conn: &Connection, read: impl FnOnce() -> Result<T>) -> Result<T> {
    if !conn.is_autocommit() {
        return read();
    }

    conn.execute_batch("BEGIN DEFERRED").map_err(map_sql_error)?;
    let result = read();
    if conn.is_autocommit() {
        return result;
    }
    let end = if result.is_ok() { "COMMIT" } else { "ROLLBACK" };
    if let Err(e) = conn.execute_batch(end) {
        warn!(error = %e, statement = end, "Ending export snapshot failed");
        if result.is_ok() {
            return Err(map_sql_error(e));
        }
    }
    result
}

pub(crate) fn export_table_on(conn: &Connection, table: &str) -> Result<Value> {
    let mut stmt =
        conn.prepare(&format!("SELECT * FROM {}", quote_ident(table))).map_err(map_sql_error)?;
    let rows = stmt.query_map([], row_to_json).map_err(map_sql_error)?;
    let rows = rows.collect::<std::result::Result<Vec<_>, _>>().map_err(map_sql_error)?;
    debug!(table = %table, rows = rows.len(), "Table read for export");
    Ok(collapse_rows(rows))
}

fn stream_table<W, L>(conn: &Connection, table: &str, sink: &mut W, listener: &mut L) -> Result<()>
where
    W: Write,
    L: ExportProgressListener + ?Sized,
{
    listener.on_table_start(table);

    let quoted = quote_ident(table);
    let total: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {quoted}"), [], |row| row.get(0))
        .map_err(map_sql_error)?;
    let total = usize::try_from(total).unwrap_or_default();
    listener.on_table_size_determined(table, total);

    let mut stmt = conn.prepare(&format!("SELECT * FROM {quoted}")).map_err(map_sql_error)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
    let single_row = total == 1;

    if !single_row {
        write_raw(sink, "[")?;
    }

    let mut rows = stmt.query([]).map_err(map_sql_error)?;
    let mut processed = 0usize;
    while let Some(row) = rows.next().map_err(map_sql_error)? {
        if processed > 0 {
            write_raw(sink, ",")?;
        }

        if columns.len() == 1 {
            write_cell(sink, row.get_ref(0).map_err(map_sql_error)?)?;
        } else {
            write_raw(sink, "{")?;
            for (index, column) in columns.iter().enumerate() {
                if index > 0 {
                    write_raw(sink, ",")?;
                }
                write_json_string(sink, column)?;
                write_raw(sink, ":")?;
                write_cell(sink, row.get_ref(index).map_err(map_sql_error)?)?;
            }
            write_raw(sink, "}")?;
        }

        processed += 1;
        listener.on_row_processed(table, processed, total);
    }

    if !single_row {
        write_raw(sink, "]")?;
    }

    listener.on_table_complete(table, processed);
    Ok(())
}

fn write_cell<W: Write>(sink: &mut W, cell: ValueRef<'_>) -> Result<()> {
    match cell {
        ValueRef::Null => write_raw(sink, "null"),
        ValueRef::Integer(i) => write_raw(sink, &i.to_string()),
        ValueRef::Real(f) => match Number::from_f64(f) {
            Some(number) => write_raw(sink, &number.to_string()),
            None => write_raw(sink, "null"),
        },
        ValueRef::Text(bytes) => write_json_string(sink, &String::from_utf8_lossy(bytes)),
        ValueRef::Blob(_) => match super::convert::cell_to_json(cell) {
            Value::String(encoded) => write_json_string(sink, &encoded),
            _ => write_raw(sink, "null"),
        },
    }
}

/// JSON string literal for `text`, quotes included.
///
/// Escapes the quote and backslash, uses the short forms for backspace, form
/// feed, newline, carriage return and tab, and `\u00XX` for every other
/// control character including U+007F to U+009F.
pub fn escape_json_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c < '\u{20}' || ('\u{7F}'..='\u{9F}').contains(&c) => {
                out.push_str(&format!("\\u{:04x}", u32::from(c)));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn write_json_string<W: Write>(sink: &mut W, text: &str) -> Result<()> {
    write_raw(sink, &escape_json_string(text))
}

fn write_raw<W: Write>(sink: &mut W, text: &str) -> Result<()> {
    sink.write_all(text.as_bytes()).map_err(sink_error)
}

fn sink_error(err: std::io::Error) -> CipherStoreError {
    CipherStoreError::Marshalling(format!("export sink failed: {err}"))
}
