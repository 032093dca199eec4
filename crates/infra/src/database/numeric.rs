//! Atomic numeric update engine.
//!
//! Every read-modify-write runs under a per-key mutex *and* a database
//! transaction. The key is `table:field:predicate`, so unrelated predicates
//! on the same field proceed independently while identical ones serialize.

use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use cipherstore_common::collections::LruCache;
use cipherstore_domain::constants::DEFAULT_LOCK_CAPACITY;
use cipherstore_domain::{CipherStoreError, FieldUpdate, NumericOutcome, Result};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use tracing::{debug, error, instrument, warn};

use super::manager::DbManager;
use super::sql::{quote_ident, where_suffix};
use crate::errors::map_sql_error;

/// Identity of one serialized numeric update
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NumericLockKey(String);

impl NumericLockKey {
    /// Build a key, collapsing whitespace in the predicate and folding in
    /// its bound arguments.
    pub fn new(table: &str, field: &str, where_clause: &str, args: &[String]) -> Self {
        let predicate = where_clause.split_whitespace().collect::<Vec<_>>().join(" ");
        Self(format!("{table}:{field}:{predicate}|{}", args.join(",")))
    }

    /// The normalized key text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NumericLockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// LRU map of per-key mutexes.
///
/// The map's own mutex covers lookup and creation only. Eviction skips
/// entries some thread still holds a handle to.
#[derive(Debug)]
pub struct LockRegistry {
    locks: Mutex<LruCache<NumericLockKey, Arc<Mutex<()>>>>,
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::with_capacity(NonZeroUsize::new(DEFAULT_LOCK_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }
}

impl LockRegistry {
    /// Registry tracking at most `capacity` idle keys
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self { locks: Mutex::new(LruCache::new(capacity)) }
    }

    /// Mutex for `key`, created on first use
    pub fn lock_for(&self, key: &NumericLockKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        if let Some(lock) = locks.get(key) {
            return Arc::clone(lock);
        }

        let lock = Arc::new(Mutex::new(()));
        let evicted =
            locks.put_retaining(key.clone(), Arc::clone(&lock), |_, held| Arc::strong_count(held) > 1);
        if evicted > 0 {
            debug!(evicted, "Evicted idle numeric locks");
        }
        lock
    }

    /// Mutexes for several keys, deduplicated and in key order so
    /// concurrent batches cannot deadlock
    pub fn locks_for(&self, keys: impl IntoIterator<Item = NumericLockKey>) -> Vec<Arc<Mutex<()>>> {
        let mut keys: Vec<NumericLockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();
        keys.iter().map(|key| self.lock_for(key)).collect()
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Whether no key is tracked
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

/// Guarded increments and decrements of numeric fields
#[derive(Debug, Clone)]
pub struct NumericFieldUpdater {
    db: Arc<DbManager>,
    locks: Arc<LockRegistry>,
}

impl NumericFieldUpdater {
    /// Updater with a private lock registry of the default capacity
    pub fn new(db: Arc<DbManager>) -> Self {
        Self::with_locks(db, Arc::new(LockRegistry::default()))
    }

    /// Share a lock registry with other updaters on the same database
    pub fn with_locks(db: Arc<DbManager>, locks: Arc<LockRegistry>) -> Self {
        Self { db, locks }
    }

    /// Manager the updates run against
    pub fn db(&self) -> &Arc<DbManager> {
        &self.db
    }

    /// Shared per-key lock registry
    pub fn locks(&self) -> &Arc<LockRegistry> {
        &self.locks
    }

    /// Add `amount` to `field` of the row whose `id` is `record_id`
    pub fn safe_increment(
        &self,
        table: &str,
        record_id: &str,
        field: &str,
        amount: i64,
    ) -> NumericOutcome {
        self.safe_update(table, "id = ?", &[record_id.to_string()], field, amount)
    }

    /// Subtract `amount`; `Insufficient` when the value would go negative
    pub fn safe_decrement(
        &self,
        table: &str,
        record_id: &str,
        field: &str,
        amount: i64,
    ) -> NumericOutcome {
        match amount.checked_neg() {
            Some(delta) => self.safe_update(table, "id = ?", &[record_id.to_string()], field, delta),
            None => {
                error!(table = %table, field = %field, "Decrement amount out of range");
                NumericOutcome::failed(format!("decrement amount {amount} is out of range"))
            }
        }
    }

    /// Apply `delta` to `field` of the first row matching the predicate.
    ///
    /// A negative `delta` that would take the value below zero is rejected
    /// without writing anything.
    #[instrument(skip(self, args), fields(table = %table, field = %field))]
    pub fn safe_update(
        &self,
        table: &str,
        where_clause: &str,
        args: &[String],
        field: &str,
        delta: i64,
    ) -> NumericOutcome {
        let key = NumericLockKey::new(table, field, where_clause, args);
        let lock = self.locks.lock_for(&key);
        let _held = lock.lock();

        let result = self
            .db
            .with_transaction(|conn| apply_delta(conn, table, where_clause, args, field, delta));

        match result {
            Ok(outcome) => {
                match &outcome {
                    NumericOutcome::NotFound => warn!(key = %key, "No row matched numeric update"),
                    NumericOutcome::Insufficient { current, requested } => {
                        warn!(key = %key, current, requested, "Rejected numeric underflow");
                    }
                    NumericOutcome::Updated { value } => debug!(key = %key, value, "Numeric update applied"),
                    NumericOutcome::Failed { reason } => warn!(key = %key, %reason, "Numeric update failed"),
                }
                outcome
            }
            Err(CipherStoreError::NotFound(_)) => {
                warn!(key = %key, "Row vanished before numeric write");
                NumericOutcome::NotFound
            }
            Err(e) => {
                error!(key = %key, error = %e, "Numeric update failed");
                NumericOutcome::failed(e.to_string())
            }
        }
    }

    /// Apply several deltas to one row, all or nothing.
    ///
    /// Every field is checked for underflow before any is written; the
    /// writes go out as a single `UPDATE`.
    #[instrument(skip(self, args, deltas), fields(table = %table, fields = deltas.len()))]
    pub fn update_multiple_fields(
        &self,
        table: &str,
        where_clause: &str,
        args: &[String],
        deltas: &BTreeMap<String, i64>,
    ) -> bool {
        if deltas.is_empty() {
            return true;
        }

        let locks = self
            .locks
            .locks_for(deltas.keys().map(|field| NumericLockKey::new(table, field, where_clause, args)));
        let _held: Vec<MutexGuard<'_, ()>> = locks.iter().map(|lock| lock.lock()).collect();

        let result = self.db.with_transaction(|conn| {
            let fields: Vec<&String> = deltas.keys().collect();
            let columns: Vec<String> = fields.iter().map(|f| quote_ident(f)).collect();
            let sql = format!(
                "SELECT {} FROM {}{} LIMIT 1",
                columns.join(", "),
                quote_ident(table),
                where_suffix(where_clause)
            );
            let current: Option<Vec<Value>> = conn
                .query_row(&sql, params_from_iter(args.iter()), |row| {
                    (0..fields.len()).map(|i| row.get::<_, Value>(i)).collect()
                })
                .optional()
                .map_err(map_sql_error)?;
            let current =
                current.ok_or_else(|| CipherStoreError::NotFound(format!("row in {table}")))?;

            let mut updated = Vec::with_capacity(fields.len());
            for (field, value) in fields.iter().zip(current) {
                let current = value_to_i64(&value, field)?;
                let delta = deltas.get(*field).copied().unwrap_or_default();
                updated.push(next_value(field, current, delta)?);
            }

            let assignments: Vec<String> = columns.iter().map(|c| format!("{c} = ?")).collect();
            let sql = format!(
                "UPDATE {} SET {}{}",
                quote_ident(table),
                assignments.join(", "),
                where_suffix(where_clause)
            );
            let mut values: Vec<Value> = updated.into_iter().map(Value::Integer).collect();
            values.extend(args.iter().cloned().map(Value::Text));
            let changed = conn.execute(&sql, params_from_iter(values)).map_err(map_sql_error)?;
            expect_single_row(table, changed)
        });

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Multi-field update rejected");
                false
            }
        }
    }

    /// Apply a list of single-field updates in one transaction.
    ///
    /// Any missing row or underflow rolls the whole batch back.
    #[instrument(skip(self, updates), fields(count = updates.len()))]
    pub fn batch_update(&self, updates: &[FieldUpdate]) -> bool {
        let locks = self.locks.locks_for(updates.iter().map(|u| {
            NumericLockKey::new(&u.table, &u.field, &u.where_clause, &u.args)
        }));
        let _held: Vec<MutexGuard<'_, ()>> = locks.iter().map(|lock| lock.lock()).collect();

        let result = self.db.with_transaction(|conn| {
            for update in updates {
                let outcome = apply_delta(
                    conn,
                    &update.table,
                    &update.where_clause,
                    &update.args,
                    &update.field,
                    update.delta,
                )?;
                match outcome {
                    NumericOutcome::Updated { .. } => {}
                    NumericOutcome::NotFound => {
                        return Err(CipherStoreError::NotFound(update.to_string()));
                    }
                    NumericOutcome::Failed { reason } => {
                        return Err(CipherStoreError::Database(format!("{update}: {reason}")));
                    }
                    NumericOutcome::Insufficient { current, requested } => {
                        return Err(CipherStoreError::Underflow {
                            field: update.field.clone(),
                            current,
                            requested,
                        });
                    }
                }
            }
            Ok(())
        });

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Batch update rolled back");
                false
            }
        }
    }
}

/// Read, validate and write one field inside the caller's transaction.
pub(crate) fn apply_delta(
    conn: &Connection,
    table: &str,
    where_clause: &str,
    args: &[String],
    field: &str,
    delta: i64,
) -> Result<NumericOutcome> {
    let Some(current) = read_value_on(conn, table, where_clause, args, field)? else {
        return Ok(NumericOutcome::NotFound);
    };
    let current = value_to_i64(&current, field)?;

    let next = match next_value(field, current, delta) {
        Ok(next) => next,
        Err(CipherStoreError::Underflow { current, requested, .. }) => {
            return Ok(NumericOutcome::Insufficient { current, requested });
        }
        Err(e) => return Err(e),
    };

    write_value_on(conn, table, where_clause, args, field, Value::Integer(next))?;
    Ok(NumericOutcome::updated(next))
}

fn next_value(field: &str, current: i64, delta: i64) -> Result<i64> {
    let next = current.checked_add(delta).ok_or_else(|| {
        CipherStoreError::Internal(format!("{field}: {current} + {delta} overflows"))
    })?;
    if delta < 0 && next < 0 {
        return Err(CipherStoreError::Underflow {
            field: field.to_string(),
            current,
            requested: delta.saturating_neg(),
        });
    }
    Ok(next)
}

/// Value of `field` in the first matching row, `None` when no row matches
pub(crate) fn read_value_on(
    conn: &Connection,
    table: &str,
    where_clause: &str,
    args: &[String],
    field: &str,
) -> Result<Option<Value>> {
    let sql = format!(
        "SELECT {} FROM {}{} LIMIT 1",
        quote_ident(field),
        quote_ident(table),
        where_suffix(where_clause)
    );
    conn.query_row(&sql, params_from_iter(args.iter()), |row| row.get::<_, Value>(0))
        .optional()
        .map_err(map_sql_error)
}

/// Set `field` on the single row matching the predicate.
///
/// A predicate matching no row or several rows is an error, so the
/// caller's transaction rolls the write back.
pub(crate) fn write_value_on(
    conn: &Connection,
    table: &str,
    where_clause: &str,
    args: &[String],
    field: &str,
    value: Value,
) -> Result<()> {
    let sql = format!(
        "UPDATE {} SET {} = ?{}",
        quote_ident(table),
        quote_ident(field),
        where_suffix(where_clause)
    );
    let mut values = vec![value];
    values.extend(args.iter().cloned().map(Value::Text));
    let changed = conn.execute(&sql, params_from_iter(values)).map_err(map_sql_error)?;
    expect_single_row(table, changed)
}

fn expect_single_row(table: &str, changed: usize) -> Result<()> {
    match changed {
        1 => Ok(()),
        0 => Err(CipherStoreError::NotFound(format!("row in {table}"))),
        n => Err(CipherStoreError::Database(format!(
            "predicate on {table} matched {n} rows; numeric updates need exactly one"
        ))),
    }
}

/// NULL reads as 0; non-numeric text is an error
pub(crate) fn value_to_i64(value: &Value, field: &str) -> Result<i64> {
    match value {
        Value::Null => Ok(0),
        Value::Integer(i) => Ok(*i),
        #[allow(clippy::cast_possible_truncation)]
        Value::Real(f) => Ok(f.trunc() as i64),
        Value::Text(text) => text.trim().parse::<i64>().map_err(|_| {
            CipherStoreError::Database(format!("{field} holds non-numeric value {text:?}"))
        }),
        Value::Blob(_) => Err(CipherStoreError::Database(format!("{field} holds a blob"))),
    }
}

/// NULL reads as 0.0; non-numeric text is an error
pub(crate) fn value_to_f64(value: &Value, field: &str) -> Result<f64> {
    match value {
        Value::Null => Ok(0.0),
        #[allow(clippy::cast_precision_loss)]
        Value::Integer(i) => Ok(*i as f64),
        Value::Real(f) => Ok(*f),
        Value::Text(text) => text.trim().parse::<f64>().map_err(|_| {
            CipherStoreError::Database(format!("{field} holds non-numeric value {text:?}"))
        }),
        Value::Blob(_) => Err(CipherStoreError::Database(format!("{field} holds a blob"))),
    }
}
