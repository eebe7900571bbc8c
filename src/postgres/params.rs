use std::error::Error;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};

use crate::types::{RowValues, format_timestamp, parse_timestamp};

/// Borrowed view of `RowValues` as tokio-postgres parameters.
pub struct Params<'a> {
    references: Vec<&'a (dyn ToSql + Sync)>,
}

impl<'a> Params<'a> {
    #[must_use]
    pub fn convert(params: &'a [RowValues]) -> Params<'a> {
        let references = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        Params { references }
    }

    #[must_use]
    pub fn as_refs(&self) -> &[&(dyn ToSql + Sync)] {
        &self.references
    }
}

fn mismatch(value: &RowValues, ty: &Type) -> Box<dyn Error + Sync + Send> {
    format!("cannot bind {} value {value:?} to a {ty} parameter", value.dtype().name()).into()
}

fn out_of_range(value: i64, ty: &Type) -> Box<dyn Error + Sync + Send> {
    format!("integer {value} does not fit in a {ty} column").into()
}

fn is_text_type(ty: &Type) -> bool {
    matches!(*ty, Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME)
}

/// Text form of a value, as bound into character columns.
fn text_form(value: &RowValues) -> String {
    match value {
        RowValues::Int(i) => i.to_string(),
        RowValues::Float(f) => f.to_string(),
        RowValues::Text(s) => s.clone(),
        RowValues::Bool(b) => b.to_string(),
        RowValues::Timestamp(dt) => format_timestamp(dt),
        RowValues::JSON(Value::String(s)) => s.clone(),
        RowValues::JSON(v) => v.to_string(),
        RowValues::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        RowValues::Null => String::new(),
    }
}

fn integer_value(value: &RowValues, ty: &Type) -> Result<i64, Box<dyn Error + Sync + Send>> {
    match value {
        RowValues::Int(i) => Ok(*i),
        #[allow(clippy::cast_possible_truncation)]
        RowValues::Float(f) if f.fract() == 0.0 && f.abs() < 9.2e18 => Ok(*f as i64),
        RowValues::Bool(b) => Ok(i64::from(*b)),
        RowValues::Text(s) => s.trim().parse().map_err(|_| mismatch(value, ty)),
        _ => Err(mismatch(value, ty)),
    }
}

fn float_value(value: &RowValues, ty: &Type) -> Result<f64, Box<dyn Error + Sync + Send>> {
    match value {
        #[allow(clippy::cast_precision_loss)]
        RowValues::Int(i) => Ok(*i as f64),
        RowValues::Float(f) => Ok(*f),
        RowValues::Text(s) => s.trim().parse().map_err(|_| mismatch(value, ty)),
        _ => Err(mismatch(value, ty)),
    }
}

fn bool_value(value: &RowValues, ty: &Type) -> Result<bool, Box<dyn Error + Sync + Send>> {
    match value {
        RowValues::Bool(b) => Ok(*b),
        RowValues::Int(0) => Ok(false),
        RowValues::Int(1) => Ok(true),
        RowValues::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" | "y" => Ok(true),
            "false" | "f" | "0" | "no" | "n" => Ok(false),
            _ => Err(mismatch(value, ty)),
        },
        _ => Err(mismatch(value, ty)),
    }
}

fn timestamp_value(
    value: &RowValues,
    ty: &Type,
) -> Result<NaiveDateTime, Box<dyn Error + Sync + Send>> {
    match value {
        RowValues::Timestamp(dt) => Ok(*dt),
        RowValues::Text(s) => parse_timestamp(s).ok_or_else(|| mismatch(value, ty)),
        _ => Err(mismatch(value, ty)),
    }
}

/// Values are coerced to the parameter type the server inferred: any value binds into a
/// character column through its text form, and text parses into numeric, boolean and temporal
/// columns.
impl ToSql for RowValues {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        if self.is_null() {
            return Ok(IsNull::Yes);
        }
        if is_text_type(ty) {
            return match self {
                RowValues::Text(s) => s.to_sql(ty, out),
                other => text_form(other).to_sql(ty, out),
            };
        }
        match *ty {
            Type::INT2 => {
                let i = integer_value(self, ty)?;
                i16::try_from(i)
                    .map_err(|_| out_of_range(i, ty))?
                    .to_sql(ty, out)
            }
            Type::INT4 => {
                let i = integer_value(self, ty)?;
                i32::try_from(i)
                    .map_err(|_| out_of_range(i, ty))?
                    .to_sql(ty, out)
            }
            Type::INT8 => integer_value(self, ty)?.to_sql(ty, out),
            #[allow(clippy::cast_possible_truncation)]
            Type::FLOAT4 => (float_value(self, ty)? as f32).to_sql(ty, out),
            Type::FLOAT8 => float_value(self, ty)?.to_sql(ty, out),
            Type::BOOL => bool_value(self, ty)?.to_sql(ty, out),
            Type::TIMESTAMPTZ => {
                let dt = timestamp_value(self, ty)?;
                DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_sql(ty, out)
            }
            Type::DATE => timestamp_value(self, ty)?.date().to_sql(ty, out),
            Type::TIMESTAMP => timestamp_value(self, ty)?.to_sql(ty, out),
            Type::JSON | Type::JSONB => match self {
                RowValues::JSON(value) => value.to_sql(ty, out),
                other => other.to_json().to_sql(ty, out),
            },
            Type::BYTEA => match self {
                RowValues::Blob(bytes) => bytes.to_sql(ty, out),
                RowValues::Text(s) => s.as_bytes().to_sql(ty, out),
                other => Err(mismatch(other, ty)),
            },
            _ => Err(mismatch(self, ty)),
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::TEXT
                | Type::VARCHAR
                | Type::BPCHAR
                | Type::NAME
                | Type::BOOL
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::DATE
                | Type::JSON
                | Type::JSONB
                | Type::BYTEA
        )
    }

    to_sql_checked!();
}
