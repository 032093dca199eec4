//! Property facade.
//!
//! Record-level numeric and value operations layered over the numeric
//! updater and the data operations, with a TTL cache of recently read or
//! written values. Cached values are held encrypted and keyed
//! `table:record_id:field`.

use std::sync::Arc;
use std::time::Duration;

use cipherstore_common::cache::{TtlCache, TtlCacheConfig};
use cipherstore_common::crypto::EncryptionService;
use cipherstore_common::time::{Clock, SystemClock};
use cipherstore_domain::constants::{DEFAULT_CACHE_TTL_SECS, QUANTITY_KEYWORDS};
use cipherstore_domain::{
    CipherStoreError, NumericOperation, NumericOutcome, NumericStats, PropertyOp, PropertyResult,
    Result,
};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection};
use serde_json::{Map, Number, Value};
use tracing::{debug, error, info, instrument, warn};

use super::data::{insert_on, query_rows_on, update_on, DataOperations, Row};
use super::manager::DbManager;
use super::marshal::cell_to_json;
use super::numeric::{
    read_value_on, value_to_f64, write_value_on, NumericFieldUpdater, NumericLockKey,
};
use super::sql::{quote_ident, where_suffix};
use crate::errors::{map_common_error, map_sql_error};

const ID_PREDICATE: &str = "id = ?";

/// Whether `field` names a quantity that structured updates accumulate
pub fn is_quantity_field(field: &str) -> bool {
    let lower = field.to_lowercase();
    QUANTITY_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Record property operations with an encrypted value cache
#[derive(Debug)]
pub struct PropertyManager<C: Clock = SystemClock> {
    updater: NumericFieldUpdater,
    data: DataOperations,
    cipher: EncryptionService,
    cache: TtlCache<String, String, C>,
}

impl PropertyManager<SystemClock> {
    /// Facade with the default five-minute cache.
    ///
    /// # Errors
    /// `Crypto` when the cache key cannot be derived from `cache_password`.
    pub fn new(db: Arc<DbManager>, cache_password: &str) -> Result<Self> {
        let config = TtlCacheConfig::new(Duration::from_secs(DEFAULT_CACHE_TTL_SECS));
        Self::with_clock(NumericFieldUpdater::new(db), cache_password, config, SystemClock)
    }
}

impl<C: Clock> PropertyManager<C> {
    /// Facade over an existing updater with a custom cache and clock
    ///
    /// # Errors
    /// `Crypto` when the cache key cannot be derived from `cache_password`.
    pub fn with_clock(
        updater: NumericFieldUpdater,
        cache_password: &str,
        config: TtlCacheConfig,
        clock: C,
    ) -> Result<Self> {
        let cipher = EncryptionService::from_password(cache_password).map_err(map_common_error)?;
        let data = DataOperations::new(Arc::clone(updater.db()));
        Ok(Self { updater, data, cipher, cache: TtlCache::with_clock(config, clock) })
    }

    /// Underlying numeric engine; its updates bypass the value cache
    pub fn updater(&self) -> &NumericFieldUpdater {
        &self.updater
    }

    /// Underlying row operations
    pub fn data(&self) -> &DataOperations {
        &self.data
    }

    /// Number of cached entries, expired ones included until purged
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Increment and cache the new value
    pub fn safe_increment(&self, table: &str, record_id: &str, field: &str, amount: i64) -> NumericOutcome {
        let outcome = self.updater.safe_increment(table, record_id, field, amount);
        self.record_outcome(table, record_id, field, &outcome);
        outcome
    }

    /// Decrement and cache the new value
    pub fn safe_decrement(&self, table: &str, record_id: &str, field: &str, amount: i64) -> NumericOutcome {
        let outcome = self.updater.safe_decrement(table, record_id, field, amount);
        self.record_outcome(table, record_id, field, &outcome);
        outcome
    }

    /// Multi-field update; drops the table's cached values
    pub fn update_multiple_fields(
        &self,
        table: &str,
        where_clause: &str,
        args: &[String],
        deltas: &std::collections::BTreeMap<String, i64>,
    ) -> bool {
        let updated = self.updater.update_multiple_fields(table, where_clause, args, deltas);
        self.clear_table_cache(table);
        updated
    }

    /// Numeric value of `field`, served from the cache when fresh
    #[allow(clippy::cast_possible_truncation)]
    #[instrument(skip(self), fields(table = %table, field = %field))]
    pub fn cached_numeric_value(&self, table: &str, record_id: &str, field: &str) -> Option<i64> {
        let key = cache_key(table, record_id, field);
        if let Some(text) = self.cached(&key) {
            match text.parse::<i64>() {
                Ok(value) => return Some(value),
                Err(_) => {
                    self.cache.remove(&key);
                }
            }
        }

        let value = self.read_field(table, record_id, field)?;
        let number = match value {
            Value::Number(number) => {
                number.as_i64().or_else(|| number.as_f64().map(|f| f.trunc() as i64))
            }
            Value::Null => Some(0),
            Value::String(text) => text.trim().parse::<i64>().ok(),
            _ => None,
        }?;
        self.store(key, &number.to_string());
        Some(number)
    }

    /// Text form of `field`, served from the cache when fresh
    #[instrument(skip(self), fields(table = %table, field = %field))]
    pub fn cached_string_value(&self, table: &str, record_id: &str, field: &str) -> Option<String> {
        let key = cache_key(table, record_id, field);
        if let Some(text) = self.cached(&key) {
            return Some(text);
        }

        let text = match self.read_field(table, record_id, field)? {
            Value::Null => return None,
            Value::String(text) => text,
            other => other.to_string(),
        };
        self.store(key, &text);
        Some(text)
    }

    /// Drop every cached value
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Drop every cached value belonging to `table`
    pub fn clear_table_cache(&self, table: &str) -> usize {
        let prefix = format!("{table}:");
        let removed = self.cache.remove_where(|key| key.starts_with(&prefix));
        if removed > 0 {
            debug!(table = %table, removed, "Table cache cleared");
        }
        removed
    }

    /// Dispatch one property operation on the record whose `id` is `record_id`
    #[instrument(skip(self, op), fields(table = %table, field = %field))]
    pub fn operate_property(
        &self,
        table: &str,
        record_id: &str,
        field: &str,
        op: PropertyOp,
    ) -> PropertyResult {
        match op {
            PropertyOp::Query => match self.read_field(table, record_id, field) {
                Some(value) => PropertyResult::Value(value),
                None => PropertyResult::Missing,
            },
            PropertyOp::Increase(amount) => {
                PropertyResult::Numeric(self.safe_increment(table, record_id, field, amount))
            }
            PropertyOp::Decrease(amount) => {
                PropertyResult::Numeric(self.safe_decrement(table, record_id, field, amount))
            }
            PropertyOp::Replace(value) => {
                let mut row = Row::new();
                row.insert(field.to_string(), value);
                let replaced = match self.data.update(table, &row, ID_PREDICATE, &[record_id.to_string()]) {
                    Ok(changed) => changed > 0,
                    Err(e) => {
                        error!(error = %e, "Property replace failed");
                        false
                    }
                };
                self.cache.remove(&cache_key(table, record_id, field));
                PropertyResult::Replaced(replaced)
            }
            PropertyOp::Exists => {
                match self.data.query_count(table, ID_PREDICATE, &[record_id.to_string()]) {
                    Ok(count) => PropertyResult::Exists(count > 0),
                    Err(e) => {
                        error!(error = %e, "Property existence check failed");
                        PropertyResult::Exists(false)
                    }
                }
            }
        }
    }

    /// Merge `values` into the matching row, inserting it when none matches.
    ///
    /// Quantity fields are added to the stored value; every other field is
    /// overwritten.
    #[instrument(skip(self, args, values), fields(table = %table))]
    pub fn structured_increment(
        &self,
        table: &str,
        where_clause: &str,
        args: &[String],
        values: &Map<String, Value>,
    ) -> bool {
        self.structured_update(table, where_clause, args, values, Direction::Increase)
    }

    /// Subtract the quantity fields in `values` from the matching row.
    ///
    /// Fails without writing when no row matches or any quantity would go
    /// negative.
    #[instrument(skip(self, args, values), fields(table = %table))]
    pub fn structured_decrease(
        &self,
        table: &str,
        where_clause: &str,
        args: &[String],
        values: &Map<String, Value>,
    ) -> bool {
        self.structured_update(table, where_clause, args, values, Direction::Decrease)
    }

    /// Apply `operations` in order to the first matching row, all or nothing.
    #[instrument(skip(self, args, operations), fields(table = %table, ops = operations.len()))]
    pub fn batch_numeric_operations(
        &self,
        table: &str,
        where_clause: &str,
        args: &[String],
        operations: &[NumericOperation],
    ) -> bool {
        let locks = self.updater.locks().locks_for(
            operations.iter().map(|op| NumericLockKey::new(table, &op.field, where_clause, args)),
        );
        let _held: Vec<_> = locks.iter().map(|lock| lock.lock()).collect();

        let result = self.updater.db().with_transaction(|conn| {
            for op in operations {
                let current = read_value_on(conn, table, where_clause, args, &op.field)?
                    .ok_or_else(|| CipherStoreError::NotFound(format!("row in {table}")))?;
                let current = value_to_f64(&current, &op.field)?;
                let next = op.apply(current).ok_or_else(|| {
                    CipherStoreError::Internal(format!("{:?} on {} rejected at {current}", op.kind, op.field))
                })?;
                write_value_on(conn, table, where_clause, args, &op.field, numeric_cell(next))?;
            }
            Ok(())
        });

        self.clear_table_cache(table);
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Numeric batch rolled back");
                false
            }
        }
    }

    /// Count, sum, average, minimum and maximum of `field`
    ///
    /// # Errors
    /// Returns the engine error for a missing table or column.
    #[instrument(skip(self, args), fields(table = %table, field = %field))]
    pub fn numeric_field_stats(
        &self,
        table: &str,
        field: &str,
        where_clause: &str,
        args: &[String],
    ) -> Result<NumericStats> {
        let column = quote_ident(field);
        let sql = format!(
            "SELECT COUNT({column}), TOTAL({column}), AVG({column}), MIN({column}), MAX({column}) \
             FROM {}{}",
            quote_ident(table),
            where_suffix(where_clause)
        );
        self.updater.db().with_connection(|conn| {
            conn.query_row(&sql, rusqlite::params_from_iter(args.iter()), |row| {
                Ok(NumericStats {
                    count: row.get(0)?,
                    sum: row.get(1)?,
                    avg: row.get::<_, Option<f64>>(2)?.unwrap_or_default(),
                    min: row.get::<_, Option<f64>>(3)?.unwrap_or_default(),
                    max: row.get::<_, Option<f64>>(4)?.unwrap_or_default(),
                })
            })
            .map_err(map_sql_error)
        })
    }

    /// Rows whose `field` lies in `[min, max]`
    #[instrument(skip(self), fields(table = %table, field = %field))]
    pub fn query_by_numeric_range(&self, table: &str, field: &str, min: f64, max: f64) -> Result<Vec<Row>> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} BETWEEN ?1 AND ?2",
            quote_ident(table),
            quote_ident(field)
        );
        self.updater.db().with_connection(|conn| {
            let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
            let rows = stmt.query_map(params![min, max], super::marshal::row_to_json).map_err(map_sql_error)?;
            rows.collect::<std::result::Result<Vec<_>, _>>().map_err(map_sql_error)
        })
    }

    fn structured_update(
        &self,
        table: &str,
        where_clause: &str,
        args: &[String],
        values: &Map<String, Value>,
        direction: Direction,
    ) -> bool {
        let quantities: Vec<&String> = values
            .iter()
            .filter(|(field, value)| is_quantity_field(field) && value.is_number())
            .map(|(field, _)| field)
            .collect();

        let locks = self.updater.locks().locks_for(
            quantities.iter().map(|field| NumericLockKey::new(table, field, where_clause, args)),
        );
        let _held: Vec<_> = locks.iter().map(|lock| lock.lock()).collect();

        let result = self.updater.db().with_transaction(|conn| {
            let current = first_row_on(conn, table, where_clause, args)?;
            let Some(current) = current else {
                return match direction {
                    Direction::Increase => insert_on(conn, table, values).map(|_| ()),
                    Direction::Decrease => {
                        Err(CipherStoreError::NotFound(format!("row in {table}")))
                    }
                };
            };

            if quantities.is_empty() {
                warn!(table = %table, "No quantity fields in structured update, writing values as given");
            }

            let mut merged = Row::new();
            for (field, value) in values {
                let next = if quantities.contains(&field) {
                    let stored = current.get(field).cloned().unwrap_or(Value::Null);
                    combine(field, &stored, value, direction)?
                } else {
                    value.clone()
                };
                merged.insert(field.clone(), next);
            }
            update_on(conn, table, &merged, where_clause, args).map(|_| ())
        });

        self.clear_table_cache(table);
        match result {
            Ok(()) => {
                info!(table = %table, quantities = quantities.len(), "Structured update applied");
                true
            }
            Err(e) => {
                warn!(error = %e, "Structured update rejected");
                false
            }
        }
    }

    fn read_field(&self, table: &str, record_id: &str, field: &str) -> Option<Value> {
        let args = [record_id.to_string()];
        let result = self.updater.db().with_connection(|conn| {
            let value = read_value_on(conn, table, ID_PREDICATE, &args, field)?;
            Ok(value.map(|value| cell_to_json(rusqlite::types::ValueRef::from(&value))))
        });
        result.unwrap_or_else(|e| {
            error!(error = %e, "Property read failed");
            None
        })
    }

    fn record_outcome(&self, table: &str, record_id: &str, field: &str, outcome: &NumericOutcome) {
        let key = cache_key(table, record_id, field);
        match outcome {
            NumericOutcome::Updated { value } => self.store(key, &value.to_string()),
            _ => {
                self.cache.remove(&key);
            }
        }
    }

    fn cached(&self, key: &str) -> Option<String> {
        let encrypted = self.cache.get(key)?;
        let decrypted = self
            .cipher
            .decrypt_from_hex(&encrypted)
            .map_err(map_common_error)
            .and_then(|bytes| {
                String::from_utf8(bytes)
                    .map_err(|e| CipherStoreError::Crypto(format!("cached value is not UTF-8: {e}")))
            });
        match decrypted {
            Ok(text) => {
                debug!(key = %key, "Cache hit");
                Some(text)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Dropping unreadable cache entry");
                self.cache.remove(key);
                None
            }
        }
    }

    fn store(&self, key: String, text: &str) {
        match self.cipher.encrypt_to_hex(text.as_bytes()) {
            Ok(encrypted) => self.cache.insert(key, encrypted),
            Err(e) => warn!(key = %key, error = %e, "Failed to cache value"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Increase,
    Decrease,
}

fn cache_key(table: &str, record_id: &str, field: &str) -> String {
    format!("{table}:{record_id}:{field}")
}

fn first_row_on(conn: &Connection, table: &str, where_clause: &str, args: &[String]) -> Result<Option<Row>> {
    let sql = format!("SELECT * FROM {}{} LIMIT 1", quote_ident(table), where_suffix(where_clause));
    Ok(query_rows_on(conn, &sql, args)?.into_iter().next())
}

/// Stored value adjusted by `delta`; integers stay integers
fn combine(field: &str, stored: &Value, delta: &Value, direction: Direction) -> Result<Value> {
    let stored_num = match stored {
        Value::Null => Some(Number::from(0)),
        Value::Number(number) => Some(number.clone()),
        Value::String(text) => text.trim().parse::<Number>().ok(),
        _ => None,
    }
    .ok_or_else(|| CipherStoreError::Database(format!("{field} holds non-numeric value {stored}")))?;
    let Value::Number(delta_num) = delta else {
        return Err(CipherStoreError::Internal(format!("{field} delta is not a number")));
    };

    if let (Some(current), Some(amount)) = (stored_num.as_i64(), delta_num.as_i64()) {
        let next = match direction {
            Direction::Increase => current.checked_add(amount),
            Direction::Decrease => current.checked_sub(amount),
        }
        .ok_or_else(|| CipherStoreError::Internal(format!("{field} overflows")))?;
        if direction == Direction::Decrease && next < 0 {
            return Err(CipherStoreError::Underflow { field: field.to_string(), current, requested: amount });
        }
        return Ok(Value::from(next));
    }

    let current = stored_num.as_f64().unwrap_or_default();
    let amount = delta_num.as_f64().unwrap_or_default();
    let next = match direction {
        Direction::Increase => current + amount,
        Direction::Decrease => current - amount,
    };
    if direction == Direction::Decrease && next < 0.0 {
        #[allow(clippy::cast_possible_truncation)]
        return Err(CipherStoreError::Underflow {
            field: field.to_string(),
            current: current as i64,
            requested: amount as i64,
        });
    }
    Number::from_f64(next)
        .map(Value::Number)
        .ok_or_else(|| CipherStoreError::Internal(format!("{field} is not finite")))
}

/// INTEGER when `value` is integral and in range, REAL otherwise
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn numeric_cell(value: f64) -> SqlValue {
    if value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 {
        SqlValue::Integer(value as i64)
    } else {
        SqlValue::Real(value)
    }
}
