//! Generic row operations.
//!
//! Thin CRUD over JSON row maps. Unlike the schema and numeric engines these
//! return `Result` so callers can branch on the constraint kind.

use std::sync::Arc;

use cipherstore_domain::{CipherStoreError, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::manager::DbManager;
use super::marshal::{json_to_row, row_to_json};
use super::sql::{placeholders, quote_ident, where_suffix};
use crate::errors::map_sql_error;

/// Row map as produced by queries and accepted by inserts
pub type Row = Map<String, Value>;

/// CRUD operations against one database
#[derive(Debug, Clone)]
pub struct DataOperations {
    db: Arc<DbManager>,
}

impl DataOperations {
    /// Row-level operations over the manager's pooled connections
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Insert one row and return its rowid.
    ///
    /// # Errors
    /// `Constraint` with the classified kind when the engine rejects the row.
    #[instrument(skip(self, row), fields(table = %table))]
    pub fn insert(&self, table: &str, row: &Row) -> Result<i64> {
        self.db.with_connection(|conn| insert_on(conn, table, row))
    }

    /// Insert every row in one transaction; any failure inserts none.
    #[instrument(skip(self, rows), fields(table = %table, rows = rows.len()))]
    pub fn batch_insert(&self, table: &str, rows: &[Row]) -> Result<usize> {
        self.db.with_transaction(|conn| {
            for row in rows {
                insert_on(conn, table, row)?;
            }
            Ok(rows.len())
        })
    }

    /// Set the columns in `row` on every matching row; returns rows changed.
    #[instrument(skip(self, row, args), fields(table = %table))]
    pub fn update(&self, table: &str, row: &Row, where_clause: &str, args: &[String]) -> Result<usize> {
        self.db.with_connection(|conn| update_on(conn, table, row, where_clause, args))
    }

    /// Update the row whose `id` column equals `id`
    pub fn update_by_id(&self, table: &str, id: i64, row: &Row) -> Result<usize> {
        self.update(table, row, "id = ?", &[id.to_string()])
    }

    /// Delete matching rows and return how many went.
    ///
    /// # Errors
    /// Returns the engine error for a bad table or predicate.
    #[instrument(skip(self, args), fields(table = %table))]
    pub fn delete(&self, table: &str, where_clause: &str, args: &[String]) -> Result<usize> {
        self.db.with_connection(|conn| {
            let sql = format!("DELETE FROM {}{}", quote_ident(table), where_suffix(where_clause));
            conn.execute(&sql, params_from_iter(args.iter())).map_err(map_sql_error)
        })
    }

    /// Delete rows by `id` in one statement
    #[instrument(skip(self, ids), fields(table = %table, ids = ids.len()))]
    pub fn delete_by_ids(&self, table: &str, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.db.with_connection(|conn| {
            let sql =
                format!("DELETE FROM {} WHERE id IN ({})", quote_ident(table), placeholders(ids.len()));
            conn.execute(&sql, params_from_iter(ids.iter())).map_err(map_sql_error)
        })
    }

    /// Select rows; an empty `columns` slice selects every column.
    #[instrument(skip(self, columns, args), fields(table = %table))]
    pub fn query(
        &self,
        table: &str,
        columns: &[&str],
        where_clause: &str,
        args: &[String],
        order_by: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        let mut sql = format!(
            "SELECT {} FROM {}{}",
            column_list(columns),
            quote_ident(table),
            where_suffix(where_clause)
        );
        if let Some(order_by) = order_by {
            sql.push_str(&format!(" ORDER BY {order_by}"));
        }
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        self.raw_query(&sql, args)
    }

    /// First matching row, if any
    pub fn query_single(&self, table: &str, where_clause: &str, args: &[String]) -> Result<Option<Row>> {
        Ok(self.query(table, &[], where_clause, args, None, Some(1))?.into_iter().next())
    }

    /// Number of rows matching the predicate; an empty predicate counts
    /// the whole table
    #[instrument(skip(self, args), fields(table = %table))]
    pub fn query_count(&self, table: &str, where_clause: &str, args: &[String]) -> Result<i64> {
        self.db.with_connection(|conn| {
            let sql =
                format!("SELECT COUNT(*) FROM {}{}", quote_ident(table), where_suffix(where_clause));
            conn.query_row(&sql, params_from_iter(args.iter()), |row| row.get(0))
                .map_err(map_sql_error)
        })
    }

    /// One page of rows; `page` starts at 1.
    ///
    /// # Errors
    /// `Internal` for a zero `page` or `page_size`.
    #[allow(clippy::too_many_arguments)]
    pub fn query_paged(
        &self,
        table: &str,
        columns: &[&str],
        where_clause: &str,
        args: &[String],
        order_by: Option<&str>,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<Row>> {
        if page == 0 || page_size == 0 {
            return Err(CipherStoreError::Internal(format!(
                "invalid page {page} of size {page_size}"
            )));
        }
        let offset = (page - 1).saturating_mul(page_size);
        let mut sql = format!(
            "SELECT {} FROM {}{}",
            column_list(columns),
            quote_ident(table),
            where_suffix(where_clause)
        );
        if let Some(order_by) = order_by {
            sql.push_str(&format!(" ORDER BY {order_by}"));
        }
        sql.push_str(&format!(" LIMIT {page_size} OFFSET {offset}"));
        self.raw_query(&sql, args)
    }

    /// Run arbitrary SQL and collect every row
    #[instrument(skip(self, args))]
    pub fn raw_query(&self, sql: &str, args: &[String]) -> Result<Vec<Row>> {
        self.db.with_connection(|conn| query_rows_on(conn, sql, args))
    }
}

/// Insert `row` on `conn` and return the new rowid
pub(crate) fn insert_on(conn: &Connection, table: &str, row: &Row) -> Result<i64> {
    let pairs = json_to_row(row);
    let sql = if pairs.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table))
    } else {
        let columns: Vec<String> = pairs.iter().map(|(column, _)| quote_ident(column)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns.join(", "),
            placeholders(pairs.len())
        )
    };
    conn.execute(&sql, params_from_iter(pairs.into_iter().map(|(_, value)| value)))
        .map_err(map_sql_error)?;
    let rowid = conn.last_insert_rowid();
    debug!(table = %table, rowid, "Row inserted");
    Ok(rowid)
}

pub(crate) fn update_on(
    conn: &Connection,
    table: &str,
    row: &Row,
    where_clause: &str,
    args: &[String],
) -> Result<usize> {
    let pairs = json_to_row(row);
    if pairs.is_empty() {
        return Ok(0);
    }
    let assignments: Vec<String> =
        pairs.iter().map(|(column, _)| format!("{} = ?", quote_ident(column))).collect();
    let sql = format!(
        "UPDATE {} SET {}{}",
        quote_ident(table),
        assignments.join(", "),
        where_suffix(where_clause)
    );
    let mut values: Vec<SqlValue> = pairs.into_iter().map(|(_, value)| value).collect();
    values.extend(args.iter().cloned().map(SqlValue::Text));
    conn.execute(&sql, params_from_iter(values)).map_err(map_sql_error)
}

pub(crate) fn query_rows_on(conn: &Connection, sql: &str, args: &[String]) -> Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql).map_err(map_sql_error)?;
    let rows = stmt.query_map(params_from_iter(args.iter()), row_to_json).map_err(map_sql_error)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(map_sql_error)
}

fn column_list(columns: &[&str]) -> String {
    if columns.is_empty() {
        "*".to_string()
    } else {
        columns.iter().map(|column| quote_ident(column)).collect::<Vec<_>>().join(", ")
    }
}
