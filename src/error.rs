use thiserror::Error;

use crate::settings::{CreateSettings, ReadSettings};

/// Context attached to a failed `read()`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadErrorDetails {
    pub table: String,
    pub schema: String,
    /// The rendered statement that was attempted.
    pub query: String,
    pub settings: Option<ReadSettings>,
}

/// Context attached to a failed `create()`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateErrorDetails {
    pub table: String,
    pub schema: String,
    pub settings: Option<CreateSettings>,
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Column '{column}' not found in table '{table}'. Available columns: {available:?}")]
    ColumnNotFound {
        column: String,
        table: String,
        available: Vec<String>,
    },

    #[error("Table '{schema}.{table}' not found")]
    TableNotFound { schema: String, table: String },

    #[error("{message}")]
    ReadError {
        message: String,
        status_code: u16,
        details: Box<ReadErrorDetails>,
        #[source]
        source: Box<DatasetError>,
    },

    #[error("{message}")]
    CreateError {
        message: String,
        status_code: u16,
        details: Box<CreateErrorDetails>,
        #[source]
        source: Option<Box<DatasetError>>,
    },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Conversion error: {0}")]
    ConversionError(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),
}

impl DatasetError {
    /// HTTP-style status marker for errors that carry one.
    ///
    /// Bad input to `create()` reports 400, execution failures 500 and unsupported operations 501.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            DatasetError::ReadError { status_code, .. }
            | DatasetError::CreateError { status_code, .. } => Some(*status_code),
            DatasetError::ColumnNotFound { .. } => Some(400),
            DatasetError::TableNotFound { .. } => Some(404),
            DatasetError::Unsupported(_) => Some(501),
            _ => None,
        }
    }
}
