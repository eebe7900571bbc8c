use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use tokio_postgres::Row;
use tokio_postgres::types::Type;

use crate::error::DatasetError;
use crate::frame::{Column, Frame};
use crate::types::{DType, RowValues};

/// Logical type for a Postgres column type. Anything unrecognised is read as text; reads select
/// such columns through `::text`.
#[must_use]
pub fn dtype_for_type(ty: &Type) -> DType {
    match *ty {
        Type::INT2 => DType::Int16,
        Type::INT4 => DType::Int32,
        Type::INT8 => DType::Int64,
        Type::FLOAT4 => DType::Float32,
        Type::FLOAT8 => DType::Float64,
        Type::BOOL => DType::Bool,
        Type::TIMESTAMP | Type::TIMESTAMPTZ => DType::Timestamp,
        Type::DATE => DType::Date,
        Type::JSON | Type::JSONB => DType::Json,
        Type::BYTEA => DType::Binary,
        _ => DType::String,
    }
}

/// Frame columns for a prepared statement's result.
#[must_use]
pub fn frame_columns(columns: &[tokio_postgres::Column]) -> Vec<Column> {
    columns
        .iter()
        .map(|c| Column::new(c.name(), dtype_for_type(c.type_())))
        .collect()
}

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns `DatasetError::PostgresError` if the column cannot be decoded.
pub fn postgres_extract_value(row: &Row, idx: usize) -> Result<RowValues, DatasetError> {
    let value = match *row.columns()[idx].type_() {
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| RowValues::Int(i64::from(v))),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| RowValues::Int(i64::from(v))),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(RowValues::Int),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| RowValues::Float(f64::from(v))),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(RowValues::Float),
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(RowValues::Bool),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(RowValues::Timestamp),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|v| RowValues::Timestamp(v.naive_utc())),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|v| RowValues::Timestamp(v.and_time(NaiveTime::MIN))),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<Value>>(idx)?.map(RowValues::JSON),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(RowValues::Blob),
        _ => row.try_get::<_, Option<String>>(idx)?.map(RowValues::Text),
    };
    Ok(value.unwrap_or(RowValues::Null))
}

/// Build a frame from rows sharing `columns`.
///
/// # Errors
/// Returns errors from value extraction.
pub fn build_frame(columns: &[Column], rows: &[Row]) -> Result<Frame, DatasetError> {
    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        let mut row_values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            row_values.push(postgres_extract_value(row, idx)?);
        }
        values.push(row_values);
    }
    Frame::with_dtypes(columns.to_vec(), values)
}
