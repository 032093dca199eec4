//! Schema evolution engine.
//!
//! Idempotent table creation, additive column migration, and column type
//! changes by rebuild-and-swap. Mutating operations return `bool` and log
//! the cause of a failure; the live table as reported by
//! `PRAGMA table_info` is always authoritative over configured schema
//! strings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cipherstore_domain::constants::{
    DATABASE_FILE_SUFFIXES, DELETE_RETRY_ATTEMPTS, DELETE_RETRY_DELAY_MS,
};
use cipherstore_domain::{
    parse_schema, CipherStoreError, ColumnInfo, ColumnSpec, ConstraintKind, Result, SchemaClause,
};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, error, info, instrument, warn};

use super::manager::DbManager;
use super::sql::{is_system_table, quote_ident};
use crate::errors::map_sql_error;

/// Suffix of the scratch table used while rebuilding
const REBUILD_SUFFIX: &str = "__rebuild";

/// Schema operations against one database
#[derive(Debug, Clone)]
pub struct SchemaManager {
    db: Arc<DbManager>,
}

impl SchemaManager {
    /// Schema operations against the database behind `db`
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Create `table` from `schema` verbatim unless it already exists.
    #[instrument(skip(self, schema), fields(table = %table))]
    pub fn create_table_if_not_exists(&self, table: &str, schema: &str) -> bool {
        let result = self.db.with_connection(|conn| create_table(conn, table, schema));
        log_outcome(result, "create table")
    }

    /// Add `column` unless it already exists.
    ///
    /// Returns true when the column was added or was already present.
    #[instrument(skip(self), fields(table = %table, column = %column))]
    pub fn add_column_if_not_exists(&self, table: &str, column: &str, data_type: &str) -> bool {
        let result = self.db.with_connection(|conn| {
            if column_exists_on(conn, table, column)? {
                debug!("Column already present");
                return Ok(());
            }
            add_column(conn, table, &format!("{column} {data_type}"))
        });
        log_outcome(result, "add column")
    }

    /// Add every column in `columns` that the table lacks, in one transaction.
    ///
    /// SQLite accepts a single column per `ALTER TABLE`, so each missing
    /// column gets its own statement. Comments are logged only.
    #[instrument(skip(self, columns), fields(table = %table, requested = columns.len()))]
    pub fn batch_add_columns(&self, table: &str, columns: &[ColumnSpec]) -> bool {
        let result = self.db.with_transaction(|conn| {
            let existing = table_info_on(conn, table)?;
            if existing.is_empty() {
                return Err(CipherStoreError::NotFound(format!("table {table}")));
            }

            let mut added = 0usize;
            for spec in columns {
                if existing.iter().any(|c| c.name.eq_ignore_ascii_case(&spec.name)) {
                    debug!(column = %spec.name, "Skipping existing column");
                    continue;
                }
                add_column(conn, table, &spec.to_add_column_sql())?;
                if let Some(comment) = &spec.comment {
                    debug!(column = %spec.name, comment = %comment, "Column comment");
                }
                added += 1;
            }
            info!(added, "Batch column addition finished");
            Ok(())
        });
        log_outcome(result, "batch add columns")
    }

    /// Change a column's declared type by rebuilding the table.
    ///
    /// Fails when the table or the column does not exist. The original table
    /// is untouched unless every step succeeds.
    #[instrument(skip(self), fields(table = %table, column = %column))]
    pub fn change_column_type(&self, table: &str, column: &str, new_type: &str) -> bool {
        let result =
            self.db.with_connection(|conn| rebuild_without_foreign_keys(conn, table, column, new_type));
        log_outcome(result, "change column type")
    }

    /// Create or additively migrate every configured table.
    pub fn reconcile(&self, table_schemas: &BTreeMap<String, String>) -> bool {
        self.db
            .with_connection(|conn| {
                reconcile_on(conn, table_schemas);
                Ok(())
            })
            .is_ok()
    }

    /// Whether `table` exists; lookup failures read as `false`
    pub fn table_exists(&self, table: &str) -> bool {
        self.db.with_connection(|conn| table_exists_on(conn, table)).unwrap_or(false)
    }

    /// Whether `table` has `column`
    pub fn column_exists(&self, table: &str, column: &str) -> bool {
        self.db.with_connection(|conn| column_exists_on(conn, table, column)).unwrap_or(false)
    }

    /// User tables, sorted by name
    pub fn table_names(&self) -> Vec<String> {
        self.db.with_connection(|conn| table_names_on(conn)).unwrap_or_else(|e| {
            error!(error = %e, "Failed to list tables");
            Vec::new()
        })
    }

    /// Live columns of `table`; empty when the table is missing
    pub fn table_structure(&self, table: &str) -> Vec<ColumnInfo> {
        self.db.with_connection(|conn| table_info_on(conn, table)).unwrap_or_else(|e| {
            error!(table = %table, error = %e, "Failed to read table structure");
            Vec::new()
        })
    }

    /// `{table: [column, ...]}` for every user table
    pub fn all_table_structures_json(&self) -> serde_json::Value {
        let result = self.db.with_connection(|conn| {
            let mut tables = serde_json::Map::new();
            for table in table_names_on(conn)? {
                let columns = table_info_on(conn, &table)?;
                tables.insert(table, serde_json::to_value(columns)?);
            }
            Ok(serde_json::Value::Object(tables))
        });
        result.unwrap_or_else(|e| {
            error!(error = %e, "Failed to describe tables");
            serde_json::Value::Object(serde_json::Map::new())
        })
    }

    /// Drop `table` if it exists
    #[instrument(skip(self), fields(table = %table))]
    pub fn drop_table(&self, table: &str) -> bool {
        let result = self.db.with_connection(|conn| {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))
                .map_err(map_sql_error)
        });
        log_outcome(result, "drop table")
    }

    /// Delete every row and reset the table's autoincrement counter.
    #[instrument(skip(self), fields(table = %table))]
    pub fn truncate_table(&self, table: &str) -> bool {
        let result = self.db.with_transaction(|conn| truncate_on(conn, table));
        log_outcome(result, "truncate table")
    }

    /// Drop every user table; returns how many were dropped
    #[instrument(skip(self))]
    pub fn drop_all_tables(&self) -> usize {
        self.for_each_table("drop table", |conn, table| {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))
                .map_err(map_sql_error)
        })
    }

    /// Truncate every user table; returns how many were emptied
    #[instrument(skip(self))]
    pub fn truncate_all_tables(&self) -> usize {
        self.for_each_table("truncate table", truncate_on)
    }

    /// Close the database and delete its file and journals.
    pub fn delete_database_files(&self) -> bool {
        self.db.close_all();
        delete_database_files(&self.db.path())
    }

    fn for_each_table<F>(&self, action: &str, f: F) -> usize
    where
        F: Fn(&Connection, &str) -> Result<()>,
    {
        let result = self.db.with_connection(|conn| {
            let mut done = 0usize;
            for table in table_names_on(conn)? {
                match f(conn.inner(), &table) {
                    Ok(()) => done += 1,
                    Err(e) => error!(table = %table, error = %e, "Failed to {action}"),
                }
            }
            Ok(done)
        });
        result.unwrap_or_else(|e| {
            error!(error = %e, "Failed to {action} for every table");
            0
        })
    }
}

/// Remove the database file and its `-wal`, `-shm` and `-journal` siblings.
///
/// Each file gets up to three attempts, 100 ms apart. Missing files count as
/// removed.
pub fn delete_database_files(path: &Path) -> bool {
    let mut all_removed = true;
    for suffix in DATABASE_FILE_SUFFIXES {
        let mut target = path.as_os_str().to_owned();
        target.push(suffix);
        let target = PathBuf::from(target);

        let mut removed = false;
        for attempt in 1..=DELETE_RETRY_ATTEMPTS {
            match std::fs::remove_file(&target) {
                Ok(()) => {
                    debug!(file = %target.display(), "Deleted database file");
                    removed = true;
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    removed = true;
                    break;
                }
                Err(e) => {
                    warn!(file = %target.display(), attempt, error = %e, "Delete failed");
                    if attempt < DELETE_RETRY_ATTEMPTS {
                        std::thread::sleep(Duration::from_millis(DELETE_RETRY_DELAY_MS));
                    }
                }
            }
        }
        all_removed &= removed;
    }
    all_removed
}

/// Create absent tables and add missing columns to existing ones.
///
/// Foreign keys only take effect at creation time, so an existing table
/// never gets table-level constraints retrofitted. Failures are logged per
/// table and do not stop the loop.
pub(crate) fn reconcile_on(conn: &Connection, table_schemas: &BTreeMap<String, String>) {
    for (table, schema) in table_schemas {
        if let Err(e) = reconcile_table(conn, table, schema) {
            error!(table = %table, error = %e, "Failed to reconcile table schema");
        }
    }
}

fn reconcile_table(conn: &Connection, table: &str, schema: &str) -> Result<()> {
    if !table_exists_on(conn, table)? {
        return create_table(conn, table, schema);
    }

    let existing = table_info_on(conn, table)?;
    for clause in parse_schema(schema) {
        match clause {
            SchemaClause::Column(column) => {
                if existing.iter().any(|c| c.name.eq_ignore_ascii_case(&column.name)) {
                    continue;
                }
                add_column(conn, table, &column.to_add_column_sql())?;
            }
            SchemaClause::TableConstraint { kind, sql } => {
                debug!(table = %table, kind = %kind, clause = %sql, "Skipping table constraint on existing table");
            }
        }
    }
    Ok(())
}

fn create_table(conn: &Connection, table: &str, schema: &str) -> Result<()> {
    if table_exists_on(conn, table)? {
        debug!(table = %table, "Table already exists");
        return Ok(());
    }
    conn.execute_batch(&format!("CREATE TABLE IF NOT EXISTS {} ({schema})", quote_ident(table)))
        .map_err(map_sql_error)?;
    info!(table = %table, "Created table");
    Ok(())
}

fn add_column(conn: &Connection, table: &str, clause: &str) -> Result<()> {
    conn.execute_batch(&format!("ALTER TABLE {} ADD COLUMN {clause}", quote_ident(table)))
        .map_err(map_sql_error)?;
    info!(table = %table, column = %clause, "Added column");
    Ok(())
}

pub(crate) fn truncate_on(conn: &Connection, table: &str) -> Result<()> {
    conn.execute_batch(&format!("DELETE FROM {}", quote_ident(table))).map_err(map_sql_error)?;
    if table_exists_on(conn, "sqlite_sequence")? {
        conn.execute("DELETE FROM sqlite_sequence WHERE name = ?1", params![table])
            .map_err(map_sql_error)?;
    }
    Ok(())
}

/// Rebuild `table` in its own transaction with foreign key enforcement
/// suspended.
///
/// Dropping the original would otherwise fire the children's `ON DELETE`
/// actions. Enforcement is restored afterwards and `foreign_key_check` must
/// come back clean before the commit. Inside a caller's transaction the
/// pragma cannot change, so that case is refused while enforcement is on.
pub(crate) fn rebuild_without_foreign_keys(
    conn: &Connection,
    table: &str,
    column: &str,
    new_type: &str,
) -> Result<()> {
    let enforced: bool =
        conn.pragma_query_value(None, "foreign_keys", |row| row.get(0)).map_err(map_sql_error)?;

    if !conn.is_autocommit() {
        if enforced {
            return Err(CipherStoreError::Migration(format!(
                "cannot rebuild {table} inside an open transaction while foreign keys are enforced"
            )));
        }
        return rebuild_with_type(conn, table, column, new_type, |_| Ok(()));
    }

    if enforced {
        conn.pragma_update(None, "foreign_keys", false).map_err(map_sql_error)?;
    }

    let result = conn.execute_batch("BEGIN IMMEDIATE").map_err(map_sql_error).and_then(|()| {
        rebuild_with_type(conn, table, column, new_type, |_| Ok(()))?;
        if enforced {
            check_foreign_keys(conn)?;
        }
        conn.execute_batch("COMMIT").map_err(map_sql_error)
    });

    if result.is_err() && !conn.is_autocommit() {
        if let Err(e) = conn.execute_batch("ROLLBACK") {
            warn!(table = %table, error = %e, "Rollback of table rebuild failed");
        }
    }
    if enforced {
        if let Err(e) = conn.pragma_update(None, "foreign_keys", true) {
            error!(error = %e, "Failed to re-enable foreign keys after rebuild");
        }
    }
    result
}

/// Fail when any row references a parent that does not exist
fn check_foreign_keys(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("PRAGMA foreign_key_check").map_err(map_sql_error)?;
    let violation: Option<(String, String)> = stmt
        .query_row([], |row| Ok((row.get(0)?, row.get(2)?)))
        .optional()
        .map_err(map_sql_error)?;
    match violation {
        Some((child, parent)) => Err(CipherStoreError::constraint(
            ConstraintKind::ForeignKey,
            format!("{child} has rows without a parent in {parent}"),
        )),
        None => Ok(()),
    }
}

/// Rebuild `table` with `column` retyped.
///
/// `before_swap` runs after the scratch table is filled and before the
/// original is dropped. Indexes and triggers on the table are recreated from
/// their stored SQL. The caller owns the transaction and the foreign key
/// setting.
pub(crate) fn rebuild_with_type<F>(
    conn: &Connection,
    table: &str,
    column: &str,
    new_type: &str,
    before_swap: F,
) -> Result<()>
where
    F: FnOnce(&Connection) -> Result<()>,
{
    let columns = table_info_on(conn, table)?;
    if columns.is_empty() {
        return Err(CipherStoreError::Migration(format!("table {table} does not exist")));
    }
    if !columns.iter().any(|c| c.name.eq_ignore_ascii_case(column)) {
        return Err(CipherStoreError::Migration(format!("column {table}.{column} does not exist")));
    }

    let scratch = format!("{table}{REBUILD_SUFFIX}");
    let definition = rebuilt_definition(&columns, column, new_type);
    let dependents = dependent_objects_on(conn, table)?;

    let migrate = |sql: String| {
        conn.execute_batch(&sql).map_err(|e| CipherStoreError::Migration(format!("{sql}: {e}")))
    };

    migrate(format!("DROP TABLE IF EXISTS {}", quote_ident(&scratch)))?;
    migrate(format!("CREATE TABLE {} ({definition})", quote_ident(&scratch)))?;
    migrate(format!("INSERT INTO {} SELECT * FROM {}", quote_ident(&scratch), quote_ident(table)))?;
    before_swap(conn)?;
    migrate(format!("DROP TABLE {}", quote_ident(table)))?;
    migrate(format!("ALTER TABLE {} RENAME TO {}", quote_ident(&scratch), quote_ident(table)))?;
    for sql in dependents {
        migrate(sql)?;
    }

    info!(table = %table, column = %column, new_type = %new_type, "Rebuilt table with new column type");
    Ok(())
}

/// Column list rebuilt from introspected metadata.
///
/// A single-column key stays inline so an `INTEGER PRIMARY KEY` keeps
/// aliasing the rowid; composite keys become a table constraint ordered by
/// key position.
fn rebuilt_definition(columns: &[ColumnInfo], target: &str, new_type: &str) -> String {
    let key_columns: Vec<&ColumnInfo> = {
        let mut keys: Vec<&ColumnInfo> = columns.iter().filter(|c| c.is_primary_key()).collect();
        keys.sort_by_key(|c| c.pk);
        keys
    };
    let inline_key = key_columns.len() == 1;

    let mut parts: Vec<String> = columns
        .iter()
        .map(|c| {
            let data_type =
                if c.name.eq_ignore_ascii_case(target) { new_type } else { c.data_type.as_str() };
            let mut part = format!("{} {data_type}", quote_ident(&c.name));
            if inline_key && c.is_primary_key() {
                part.push_str(" PRIMARY KEY");
            }
            if c.not_null {
                part.push_str(" NOT NULL");
            }
            if let Some(default) = &c.default_value {
                part.push_str(" DEFAULT ");
                part.push_str(default);
            }
            part.trim_end().to_string()
        })
        .collect();

    if key_columns.len() > 1 {
        let names: Vec<String> = key_columns.iter().map(|c| quote_ident(&c.name)).collect();
        parts.push(format!("PRIMARY KEY ({})", names.join(", ")));
    }
    parts.join(", ")
}

/// Stored SQL of the explicit indexes and triggers on `table`, indexes first
fn dependent_objects_on(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT sql FROM sqlite_master
             WHERE tbl_name = ?1 COLLATE NOCASE AND type IN ('index', 'trigger') AND sql IS NOT NULL
             ORDER BY type, name",
        )
        .map_err(map_sql_error)?;
    let rows = stmt.query_map(params![table], |row| row.get::<_, String>(0)).map_err(map_sql_error)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(map_sql_error)
}

pub(crate) fn table_exists_on(conn: &Connection, table: &str) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(map_sql_error)
}

pub(crate) fn column_exists_on(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    Ok(table_info_on(conn, table)?.iter().any(|c| c.name.eq_ignore_ascii_case(column)))
}

pub(crate) fn table_info_on(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>> {
    let mut stmt = conn
        .prepare("SELECT cid, name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1)")
        .map_err(map_sql_error)?;
    let rows = stmt
        .query_map(params![table], |row| {
            Ok(ColumnInfo {
                cid: row.get(0)?,
                name: row.get(1)?,
                data_type: row.get(2)?,
                not_null: row.get::<_, i64>(3)? != 0,
                default_value: row.get(4)?,
                pk: row.get(5)?,
            })
        })
        .map_err(map_sql_error)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(map_sql_error)
}

pub(crate) fn table_names_on(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .map_err(map_sql_error)?;
    let names = stmt.query_map([], |row| row.get::<_, String>(0)).map_err(map_sql_error)?;

    let mut tables = Vec::new();
    for name in names {
        let name = name.map_err(map_sql_error)?;
        if !is_system_table(&name) {
            tables.push(name);
        }
    }
    Ok(tables)
}

fn log_outcome(result: Result<()>, action: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, "Failed to {action}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for database::schema.
    use rusqlite::Connection;

    use super::*;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory database");
        conn.execute_batch(
            "CREATE TABLE players (id INTEGER PRIMARY KEY, name TEXT NOT NULL DEFAULT 'anon', gold INTEGER);
             INSERT INTO players (id, name, gold) VALUES (1, 'ada', 100), (2, 'bob', 5);",
        )
        .expect("fixture created");
        conn
    }

    /// Validates the rebuilt definition reproduces key, not-null and default
    /// clauses from metadata.
    #[test]
    fn rebuilt_definition_keeps_constraints() {
        let conn = memory();
        let columns = table_info_on(&conn, "players").expect("table info");

        let definition = rebuilt_definition(&columns, "gold", "REAL");
        assert_eq!(
            definition,
            "\"id\" INTEGER PRIMARY KEY, \"name\" TEXT NOT NULL DEFAULT 'anon', \"gold\" REAL"
        );
    }

    /// Validates composite keys become a table constraint.
    #[test]
    fn rebuilt_definition_composite_key() {
        let conn = Connection::open_in_memory().expect("in-memory database");
        conn.execute_batch("CREATE TABLE slots (owner INTEGER, slot INTEGER, item TEXT, PRIMARY KEY (owner, slot))")
            .expect("fixture created");
        let columns = table_info_on(&conn, "slots").expect("table info");

        let definition = rebuilt_definition(&columns, "item", "BLOB");
        assert!(definition.ends_with("PRIMARY KEY (\"owner\", \"slot\")"));
        assert!(definition.contains("\"item\" BLOB"));
    }

    /// Validates a failure injected after the scratch table is populated
    /// leaves the original untouched.
    ///
    /// Assertions:
    /// - Confirms the rebuild returns an error.
    /// - Confirms the original rows and column type survive the rollback.
    /// - Confirms no scratch table is left behind.
    #[test]
    fn rebuild_failure_before_swap_is_atomic() {
        let conn = memory();
        conn.execute_batch("BEGIN IMMEDIATE").expect("begin");
        let result = rebuild_with_type(&conn, "players", "gold", "REAL", |_| {
            Err(CipherStoreError::Migration("injected".into()))
        });
        assert!(result.is_err());
        conn.execute_batch("ROLLBACK").expect("rollback");

        let gold: i64 = conn
            .query_row("SELECT gold FROM players WHERE id = 1", [], |row| row.get(0))
            .expect("original readable");
        assert_eq!(gold, 100);

        let columns = table_info_on(&conn, "players").expect("table info");
        assert_eq!(columns[2].data_type, "INTEGER");
        assert!(!table_exists_on(&conn, "players__rebuild").expect("lookup"));
    }

    /// Validates a successful rebuild keeps rows and changes the type.
    #[test]
    fn rebuild_changes_type() {
        let conn = memory();
        rebuild_with_type(&conn, "players", "gold", "REAL", |_| Ok(())).expect("rebuild succeeds");

        let columns = table_info_on(&conn, "players").expect("table info");
        assert_eq!(columns[2].data_type, "REAL");
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM players", [], |row| row.get(0)).expect("count");
        assert_eq!(count, 2);
    }

    /// Validates indexes and triggers come back after a rebuild.
    #[test]
    fn rebuild_restores_indexes_and_triggers() {
        let conn = memory();
        conn.execute_batch(
            "CREATE UNIQUE INDEX players_name ON players (name);
             CREATE TABLE audit (player INTEGER);
             CREATE TRIGGER players_audit AFTER UPDATE ON players
             BEGIN INSERT INTO audit VALUES (NEW.id); END;",
        )
        .expect("dependents created");

        rebuild_with_type(&conn, "players", "gold", "REAL", |_| Ok(())).expect("rebuild succeeds");

        let restored: Vec<String> = dependent_objects_on(&conn, "players").expect("dependents");
        assert_eq!(restored.len(), 2);
        conn.execute("UPDATE players SET gold = 1 WHERE id = 1", []).expect("update");
        let audited: i64 =
            conn.query_row("SELECT COUNT(*) FROM audit", [], |row| row.get(0)).expect("count");
        assert_eq!(audited, 1);
    }

    /// Validates a cascading child keeps its rows through the rebuild.
    ///
    /// Assertions:
    /// - Confirms the child rows survive.
    /// - Confirms enforcement is back on afterwards.
    /// - Ensures the rebuild is refused inside a transaction while enforced.
    #[test]
    fn rebuild_suspends_foreign_keys() {
        let conn = memory();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE items (id INTEGER PRIMARY KEY,
                 owner INTEGER REFERENCES players(id) ON DELETE CASCADE);
             INSERT INTO items VALUES (1, 1), (2, 2);",
        )
        .expect("child created");

        rebuild_without_foreign_keys(&conn, "players", "gold", "REAL").expect("rebuild succeeds");

        let items: i64 =
            conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0)).expect("count");
        assert_eq!(items, 2);
        let enforced: i64 =
            conn.pragma_query_value(None, "foreign_keys", |row| row.get(0)).expect("pragma");
        assert_eq!(enforced, 1);

        conn.execute_batch("BEGIN").expect("begin");
        assert!(rebuild_without_foreign_keys(&conn, "players", "gold", "TEXT").is_err());
        conn.execute_batch("ROLLBACK").expect("rollback");
    }

    /// Validates missing tables and columns are rejected.
    #[test]
    fn rebuild_rejects_missing_targets() {
        let conn = memory();
        assert!(rebuild_with_type(&conn, "ghosts", "gold", "REAL", |_| Ok(())).is_err());
        assert!(rebuild_with_type(&conn, "players", "xp", "REAL", |_| Ok(())).is_err());
    }

    /// Validates reconcile adds columns but never table constraints.
    ///
    /// Assertions:
    /// - Confirms the missing `level` column is added with its default.
    /// - Confirms the FOREIGN KEY clause does not break reconciliation.
    /// - Confirms a new table is created with the full schema.
    #[test]
    fn reconcile_is_additive() {
        let conn = memory();
        let mut schemas = BTreeMap::new();
        schemas.insert(
            "players".to_string(),
            "id INTEGER PRIMARY KEY, name TEXT, gold INTEGER, level INTEGER NOT NULL DEFAULT 1, \
             guild_id INTEGER, FOREIGN KEY (guild_id) REFERENCES guilds(id)"
                .to_string(),
        );
        schemas.insert("guilds".to_string(), "id INTEGER PRIMARY KEY, title TEXT".to_string());

        reconcile_on(&conn, &schemas);

        let names: Vec<String> =
            table_info_on(&conn, "players").expect("info").into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["id", "name", "gold", "level", "guild_id"]);
        let level: i64 = conn
            .query_row("SELECT level FROM players WHERE id = 1", [], |row| row.get(0))
            .expect("level readable");
        assert_eq!(level, 1);
        assert!(table_exists_on(&conn, "guilds").expect("lookup"));
    }

    /// Validates system tables are excluded from the listing.
    #[test]
    fn table_names_skip_system_tables() {
        let conn = memory();
        conn.execute_batch(
            "CREATE TABLE android_metadata (locale TEXT);
             CREATE TABLE seq (id INTEGER PRIMARY KEY AUTOINCREMENT);
             INSERT INTO seq DEFAULT VALUES;",
        )
        .expect("fixtures created");

        let names = table_names_on(&conn).expect("names");
        assert_eq!(names, vec!["players".to_string(), "seq".to_string()]);
    }

    /// Validates truncation resets the autoincrement counter.
    #[test]
    fn truncate_resets_sequence() {
        let conn = memory();
        conn.execute_batch(
            "CREATE TABLE seq (id INTEGER PRIMARY KEY AUTOINCREMENT, v TEXT);
             INSERT INTO seq (v) VALUES ('a'), ('b');",
        )
        .expect("fixtures created");

        truncate_on(&conn, "seq").expect("truncate succeeds");
        conn.execute("INSERT INTO seq (v) VALUES ('c')", []).expect("insert");
        let id: i64 = conn.query_row("SELECT id FROM seq", [], |row| row.get(0)).expect("id");
        assert_eq!(id, 1);
    }

    /// Validates file deletion treats missing files as removed.
    #[test]
    fn delete_database_files_removes_siblings() {
        let dir = tempfile::TempDir::new().expect("temp dir created");
        let db = dir.path().join("game.db");
        std::fs::write(&db, b"x").expect("write main");
        std::fs::write(dir.path().join("game.db-wal"), b"x").expect("write wal");

        assert!(delete_database_files(&db));
        assert!(!db.exists());
        assert!(!dir.path().join("game.db-wal").exists());
    }
}
