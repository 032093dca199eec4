//! Cell and row conversion between SQLite values and JSON.
//!
//! INTEGER and REAL become numbers, TEXT a string, BLOB a base64 string and
//! NULL `null`. Going the other way, booleans become 0/1 and nested arrays or
//! objects are stored as JSON text. BLOBs do not round-trip: the import side
//! stores the base64 text as given.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Row;
use serde_json::{Map, Number, Value};

/// JSON form of one cell; non-finite reals become `null`
pub fn cell_to_json(cell: ValueRef<'_>) -> Value {
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(BASE64.encode(bytes)),
    }
}

/// Object keyed by column name for the current row
pub fn row_to_json(row: &Row<'_>) -> rusqlite::Result<Map<String, Value>> {
    let stmt = row.as_ref();
    let mut object = Map::new();
    for index in 0..stmt.column_count() {
        let name = stmt.column_name(index)?.to_string();
        object.insert(name, cell_to_json(row.get_ref(index)?));
    }
    Ok(object)
}

/// Bindable value for one JSON value
pub fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => number.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// Column/value pairs for an insert or update
pub fn json_to_row(object: &Map<String, Value>) -> Vec<(String, SqlValue)> {
    object.iter().map(|(column, value)| (column.clone(), json_to_sql(value))).collect()
}

/// Collapse exported rows: one row becomes the row itself, anything else an
/// array. A one-column row is its bare value.
pub fn collapse_rows(mut rows: Vec<Map<String, Value>>) -> Value {
    if rows.len() == 1 {
        if let Some(row) = rows.pop() {
            return collapse_row(row);
        }
    }
    Value::Array(rows.into_iter().map(collapse_row).collect())
}

fn collapse_row(row: Map<String, Value>) -> Value {
    if row.len() == 1 {
        row.into_iter().next().map_or(Value::Null, |(_, value)| value)
    } else {
        Value::Object(row)
    }
}
