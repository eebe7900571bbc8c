use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::error::DatasetError;

/// Values stored in a [`Frame`](crate::frame::Frame) cell or bound as statement parameters.
///
/// The same enum is used by every backend so read and write paths do not need to branch on
/// driver types:
/// ```rust
/// use sql_dataset::prelude::*;
///
/// let row = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = row;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RowValues::Bool(value) => Some(*value),
            RowValues::Int(1) => Some(true),
            RowValues::Int(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        }
        self.as_text().and_then(parse_timestamp)
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            RowValues::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            RowValues::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Logical type a lone value of this variant would carry.
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            RowValues::Int(_) => DType::Int64,
            RowValues::Float(_) => DType::Float64,
            RowValues::Text(_) => DType::String,
            RowValues::Bool(_) => DType::Bool,
            RowValues::Timestamp(_) => DType::Timestamp,
            RowValues::Null => DType::Null,
            RowValues::JSON(_) => DType::Json,
            RowValues::Blob(_) => DType::Binary,
        }
    }

    /// Convert a JSON scalar (or nested value) into a cell value.
    #[must_use]
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => RowValues::Null,
            JsonValue::Bool(b) => RowValues::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => RowValues::Int(i),
                None => n.as_f64().map_or(RowValues::Null, RowValues::Float),
            },
            JsonValue::String(s) => RowValues::Text(s),
            other => RowValues::JSON(other),
        }
    }

    /// Render this value as JSON. Timestamps become `YYYY-MM-DD HH:MM:SS[.f]` strings and blobs
    /// become arrays of bytes.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            RowValues::Int(i) => JsonValue::from(*i),
            RowValues::Float(f) => JsonValue::from(*f),
            RowValues::Text(s) => JsonValue::String(s.clone()),
            RowValues::Bool(b) => JsonValue::Bool(*b),
            RowValues::Timestamp(dt) => JsonValue::String(format_timestamp(dt)),
            RowValues::Null => JsonValue::Null,
            RowValues::JSON(v) => v.clone(),
            RowValues::Blob(bytes) => JsonValue::from(bytes.clone()),
        }
    }
}

impl fmt::Display for RowValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowValues::Text(s) => write!(f, "'{s}'"),
            RowValues::Null => f.write_str("NULL"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl Serialize for RowValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RowValues {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        JsonValue::deserialize(deserializer).map(RowValues::from_json)
    }
}

/// Format used when timestamps travel as text (`SQLite` storage, JSON interchange).
#[must_use]
pub fn format_timestamp(dt: &NaiveDateTime) -> String {
    dt.format("%F %T%.f").to_string()
}

/// Parse the timestamp layouts produced by [`format_timestamp`], ISO-8601 with a `T`
/// separator, and bare dates.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    for layout in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, layout) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// Logical column type of a [`Frame`](crate::frame::Frame) column.
///
/// The names returned by [`DType::name`] are what ends up in a dataset's schema map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
    Timestamp,
    Date,
    String,
    #[serde(rename = "category")]
    Categorical,
    Json,
    Binary,
    /// Mixed values with no common logical type.
    Object,
    /// Every value seen so far was NULL.
    Null,
}

impl DType {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Bool => "bool",
            DType::Timestamp => "timestamp",
            DType::Date => "date",
            DType::String => "string",
            DType::Categorical => "category",
            DType::Json => "json",
            DType::Binary => "binary",
            DType::Object => "object",
            DType::Null => "null",
        }
    }

    /// Storage width in bytes for fixed-width numeric types.
    #[must_use]
    pub fn item_size(self) -> Option<u8> {
        match self {
            DType::Int8 => Some(1),
            DType::Int16 => Some(2),
            DType::Int32 | DType::Float32 => Some(4),
            DType::Int64 | DType::Float64 => Some(8),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(self, DType::Int8 | DType::Int16 | DType::Int32 | DType::Int64)
    }

    #[must_use]
    pub fn is_small_integer(self) -> bool {
        self.is_integer() && self.item_size().is_some_and(|size| size <= 2)
    }

    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }

    #[must_use]
    pub fn is_bool(self) -> bool {
        self == DType::Bool
    }

    #[must_use]
    pub fn is_temporal(self) -> bool {
        matches!(self, DType::Timestamp | DType::Date)
    }

    #[must_use]
    pub fn is_textual(self) -> bool {
        matches!(self, DType::String | DType::Categorical)
    }

    /// Common type of two column observations, used when inferring dtypes from values.
    #[must_use]
    pub fn unify(self, other: DType) -> DType {
        match (self, other) {
            (a, b) if a == b => a,
            (DType::Null, b) => b,
            (a, DType::Null) => a,
            (a, b) if a.is_integer() && b.is_integer() => DType::Int64,
            (a, b) if (a.is_integer() || a.is_float()) && (b.is_integer() || b.is_float()) => {
                DType::Float64
            }
            (a, b) if a.is_temporal() && b.is_temporal() => DType::Timestamp,
            _ => DType::Object,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DType {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dtype = match s.to_ascii_lowercase().as_str() {
            "int8" => DType::Int8,
            "int16" => DType::Int16,
            "int32" => DType::Int32,
            "int64" | "int" => DType::Int64,
            "float32" => DType::Float32,
            "float64" | "float" => DType::Float64,
            "bool" | "boolean" => DType::Bool,
            "timestamp" | "datetime" => DType::Timestamp,
            "date" => DType::Date,
            "string" | "str" => DType::String,
            "category" => DType::Categorical,
            "json" => DType::Json,
            "binary" => DType::Binary,
            "object" => DType::Object,
            "null" => DType::Null,
            other => {
                return Err(DatasetError::ConversionError(format!(
                    "unknown dtype '{other}'"
                )));
            }
        };
        Ok(dtype)
    }
}

/// The database backends this crate can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum DatabaseType {
    /// `PostgreSQL` database
    #[cfg(feature = "postgres")]
    Postgres,
    /// `SQLite` database
    #[cfg(feature = "sqlite")]
    Sqlite,
}

impl DatabaseType {
    /// Pick the backend from a connection URI scheme.
    ///
    /// `postgres://`, `postgresql://` (optionally with a `+driver` suffix) and `sqlite:` are
    /// recognised.
    ///
    /// # Errors
    /// Returns `DatasetError::ConfigError` for unknown schemes and `DatasetError::Unimplemented`
    /// for backends not compiled in.
    pub fn from_uri(uri: &str) -> Result<Self, DatasetError> {
        let scheme = uri
            .split_once(':')
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .ok_or_else(|| {
                DatasetError::ConfigError(format!("connection URI has no scheme: '{uri}'"))
            })?;
        let base = scheme.split('+').next().unwrap_or_default();

        match base {
            #[cfg(feature = "postgres")]
            "postgres" | "postgresql" => Ok(DatabaseType::Postgres),
            #[cfg(feature = "sqlite")]
            "sqlite" => Ok(DatabaseType::Sqlite),
            #[allow(unreachable_patterns)]
            "postgres" | "postgresql" | "sqlite" => Err(DatasetError::Unimplemented(format!(
                "backend '{base}' is not enabled in the current build"
            ))),
            other => Err(DatasetError::ConfigError(format!(
                "unsupported connection scheme '{other}'"
            ))),
        }
    }
}

/// Resource identifiers reported to the host framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    LinkedService,
    Dataset,
}

impl ResourceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::LinkedService => "DS.RESOURCE.LINKED_SERVICE.SQL",
            ResourceKind::Dataset => "DS.RESOURCE.DATASET.SQL",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
