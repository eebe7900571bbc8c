use rusqlite::Connection;
use rusqlite::types::Value;

use crate::dialect::Dialect;
use crate::engine::TableColumn;
use crate::error::DatasetError;
use crate::frame::{Column, Frame};
use crate::query_builder::RenderedQuery;
use crate::types::{DType, RowValues, parse_timestamp};

use super::params::Params;

/// Logical type for a declared column type, following `SQLite`'s affinity rules with the
/// common boolean and date/time names recognised first.
#[must_use]
pub fn dtype_for_declared(declared: &str) -> DType {
    let upper = declared.to_ascii_uppercase();
    if upper.contains("BOOL") {
        DType::Bool
    } else if upper.contains("DATETIME") || upper.contains("TIMESTAMP") {
        DType::Timestamp
    } else if upper.contains("DATE") {
        DType::Date
    } else if upper.contains("INT") {
        if ["SMALLINT", "INT2", "TINYINT"].iter().any(|n| upper.contains(n)) {
            DType::Int16
        } else {
            DType::Int64
        }
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        DType::String
    } else if upper.contains("BLOB") {
        DType::Binary
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        DType::Float64
    } else if upper.contains("JSON") {
        DType::Json
    } else {
        DType::Object
    }
}

/// Extract a `RowValues` from a `SQLite` row, reading it as `dtype`.
///
/// # Errors
/// Returns `DatasetError::SqliteError` if the column cannot be read.
pub fn sqlite_extract_value(
    row: &rusqlite::Row,
    idx: usize,
    dtype: DType,
) -> Result<RowValues, DatasetError> {
    let value: Value = row.get(idx)?;
    Ok(convert_value(value, dtype))
}

/// Interpret a stored value according to its column's logical type. Values that do not fit
/// the type are returned as stored.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn convert_value(value: Value, dtype: DType) -> RowValues {
    match (value, dtype) {
        (Value::Null, _) => RowValues::Null,
        (Value::Integer(i), DType::Bool) => RowValues::Bool(i != 0),
        (Value::Integer(i), d) if d.is_float() => RowValues::Float(i as f64),
        (Value::Integer(i), _) => RowValues::Int(i),
        (Value::Real(f), _) => RowValues::Float(f),
        (Value::Text(s), DType::Timestamp | DType::Date) => match parse_timestamp(&s) {
            Some(dt) => RowValues::Timestamp(dt),
            None => RowValues::Text(s),
        },
        (Value::Text(s), DType::Json) => match serde_json::from_str(&s) {
            Ok(json) => RowValues::JSON(json),
            Err(_) => RowValues::Text(s),
        },
        (Value::Text(s), _) => RowValues::Text(s),
        (Value::Blob(b), _) => RowValues::Blob(b),
    }
}

/// Columns of `schema.table` in declaration order. Empty when the table does not exist.
///
/// # Errors
/// Returns `DatasetError::SqliteError` if the pragma fails.
pub fn table_columns(
    conn: &Connection,
    schema: &str,
    table: &str,
) -> Result<Vec<TableColumn>, DatasetError> {
    let dialect = Dialect::Sqlite;
    let sql = format!(
        "PRAGMA {}.table_info({})",
        dialect.quote_ident(schema),
        dialect.quote_ident(table)
    );
    let mut stmt = conn.prepare(&sql)?;
    let columns = stmt
        .query_map([], |row| {
            Ok(TableColumn::new(
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Whether `schema.table` exists.
///
/// # Errors
/// Returns `DatasetError::SqliteError` if the catalog query fails.
pub fn table_exists(conn: &Connection, schema: &str, table: &str) -> Result<bool, DatasetError> {
    let sql = format!(
        "SELECT count(*) FROM {}.sqlite_master WHERE type = 'table' AND name = ?1",
        Dialect::Sqlite.quote_ident(schema)
    );
    let count: i64 = conn.query_row(&sql, [table], |row| row.get(0))?;
    Ok(count > 0)
}

/// Run `query` and split the result into frames of at most `chunk_size` rows. Declared
/// column types decide how stored values are read; columns without a usable declaration
/// take the type of their values.
///
/// # Errors
/// Returns `DatasetError::SqliteError` if preparing or stepping the statement fails.
pub fn query_chunks(
    conn: &Connection,
    query: &RenderedQuery,
    declared: &[DType],
    chunk_size: usize,
) -> Result<Vec<Frame>, DatasetError> {
    let chunk_size = chunk_size.max(1);
    let params = Params::convert(&query.params);
    let mut stmt = conn.prepare(&query.sql)?;
    let names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let dtypes: Vec<DType> = (0..names.len())
        .map(|idx| declared.get(idx).copied().unwrap_or(DType::Object))
        .collect();

    let mut chunks = Vec::new();
    let mut pending: Vec<Vec<RowValues>> = Vec::new();
    let mut rows = stmt.query(rusqlite::params_from_iter(params.as_values()))?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(names.len());
        for (idx, dtype) in dtypes.iter().enumerate() {
            values.push(sqlite_extract_value(row, idx, *dtype)?);
        }
        pending.push(values);
        if pending.len() == chunk_size {
            chunks.push(chunk_frame(&names, &dtypes, std::mem::take(&mut pending))?);
        }
    }
    if !pending.is_empty() || chunks.is_empty() {
        chunks.push(chunk_frame(&names, &dtypes, pending)?);
    }
    Ok(chunks)
}

fn chunk_frame(
    names: &[String],
    dtypes: &[DType],
    rows: Vec<Vec<RowValues>>,
) -> Result<Frame, DatasetError> {
    let columns = names
        .iter()
        .zip(dtypes)
        .enumerate()
        .map(|(idx, (name, dtype))| {
            let dtype = if *dtype == DType::Object {
                rows.iter()
                    .map(|row| row[idx].dtype())
                    .fold(DType::Null, DType::unify)
            } else {
                *dtype
            };
            Column::new(name.clone(), dtype)
        })
        .collect();
    Frame::with_dtypes(columns, rows)
}
