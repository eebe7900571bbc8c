//! The seam between the dataset core and a database backend.
//!
//! A [`Connector`] turns [`LinkedServiceSettings`] into a live [`Engine`] (a connection pool plus
//! the operations the dataset needs). [`DefaultConnector`] picks the backend from the URI scheme;
//! tests and hosts can supply their own.

use std::borrow::Cow;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::dialect::Dialect;
use crate::error::DatasetError;
use crate::frame::Frame;
use crate::query_builder::SelectStatement;
use crate::settings::{LinkedServiceSettings, WriteMode};
use crate::type_mapper::{ColumnDecl, TargetColumnType};
#[cfg(any(feature = "postgres", feature = "sqlite"))]
use crate::types::DatabaseType;

/// A column discovered by reflecting a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    /// Declared SQL type as reported by the database.
    pub sql_type: String,
}

impl TableColumn {
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
        }
    }
}

/// A resolved remote table. Reflected per operation and never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
    pub columns: Vec<TableColumn>,
}

impl TableRef {
    #[must_use]
    pub fn new(schema: impl Into<String>, name: impl Into<String>, columns: Vec<TableColumn>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            columns,
        }
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&TableColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in table order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Snapshot of a pool's occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatus {
    pub connections: u32,
    pub idle_connections: u32,
    pub max_size: u32,
}

/// Everything a backend needs to carry out a bulk write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub schema: String,
    pub table: String,
    pub mode: WriteMode,
    /// Prepend the row position as an `index` column.
    pub index: bool,
    /// Column types to declare if the write creates the table.
    pub column_types: Vec<ColumnDecl>,
}

/// A live, pooled database handle.
#[async_trait]
pub trait Engine: Send + Sync + Debug {
    fn dialect(&self) -> Dialect;

    /// Current pool occupancy.
    fn status(&self) -> PoolStatus;

    /// Check out a connection and run `SELECT 1` inside a transaction.
    async fn probe(&self) -> Result<(), DatasetError>;

    /// Discover the columns of `schema.table`.
    ///
    /// Fails with `DatasetError::TableNotFound` when the table does not exist.
    async fn reflect_table(&self, schema: &str, table: &str) -> Result<TableRef, DatasetError>;

    /// Execute `statement`, returning the result in chunks of at most `chunk_size` rows.
    ///
    /// At least one (possibly empty) chunk is returned so callers always see the result columns.
    async fn fetch_chunks(
        &self,
        statement: &SelectStatement,
        chunk_size: usize,
    ) -> Result<Vec<Frame>, DatasetError>;

    /// Write `frame` in a single transaction, returning the number of rows inserted.
    async fn write_frame(&self, frame: &Frame, request: &WriteRequest) -> Result<u64, DatasetError>;

    /// Release the pool. Later calls on this engine fail with a connection error.
    fn dispose(&self);
}

/// Builds engines from linked-service settings.
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    async fn create_engine(
        &self,
        settings: &LinkedServiceSettings,
    ) -> Result<Arc<dyn Engine>, DatasetError>;
}

/// Chooses the backend from the URI scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConnector;

#[async_trait]
impl Connector for DefaultConnector {
    async fn create_engine(
        &self,
        settings: &LinkedServiceSettings,
    ) -> Result<Arc<dyn Engine>, DatasetError> {
        settings.validate()?;
        engine_for_uri(settings)
    }
}

#[cfg(any(feature = "postgres", feature = "sqlite"))]
fn engine_for_uri(settings: &LinkedServiceSettings) -> Result<Arc<dyn Engine>, DatasetError> {
    let engine: Arc<dyn Engine> = match DatabaseType::from_uri(&settings.uri)? {
        #[cfg(feature = "postgres")]
        DatabaseType::Postgres => Arc::new(crate::postgres::PostgresEngine::from_settings(settings)?),
        #[cfg(feature = "sqlite")]
        DatabaseType::Sqlite => Arc::new(crate::sqlite::SqliteEngine::from_settings(settings)?),
    };
    Ok(engine)
}

#[cfg(not(any(feature = "postgres", feature = "sqlite")))]
fn engine_for_uri(_settings: &LinkedServiceSettings) -> Result<Arc<dyn Engine>, DatasetError> {
    Err(DatasetError::Unimplemented(
        "no database backend is enabled in the current build".to_string(),
    ))
}

/// What a bulk write must do before inserting, given whether the table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePlan {
    pub drop_table: bool,
    pub delete_rows: bool,
    pub create_table: bool,
}

impl WritePlan {
    /// # Errors
    /// Returns `DatasetError::ExecutionError` for [`WriteMode::Fail`] on an existing table.
    pub fn for_mode(
        mode: WriteMode,
        table_exists: bool,
        qualified_name: &str,
    ) -> Result<Self, DatasetError> {
        let plan = match (mode, table_exists) {
            (WriteMode::Fail, true) => {
                return Err(DatasetError::ExecutionError(format!(
                    "Table {qualified_name} already exists."
                )));
            }
            (_, false) => WritePlan {
                drop_table: false,
                delete_rows: false,
                create_table: true,
            },
            (WriteMode::Append, true) => WritePlan {
                drop_table: false,
                delete_rows: false,
                create_table: false,
            },
            (WriteMode::Replace, true) => WritePlan {
                drop_table: true,
                delete_rows: false,
                create_table: true,
            },
            (WriteMode::DeleteRows, true) => WritePlan {
                drop_table: false,
                delete_rows: true,
                create_table: false,
            },
        };
        Ok(plan)
    }
}

/// The frame and column declarations a backend actually writes, with the `index` column
/// prepended when the request asks for it.
#[must_use]
pub fn prepare_write<'f>(
    frame: &'f Frame,
    request: &WriteRequest,
) -> (Cow<'f, Frame>, Vec<ColumnDecl>) {
    if !request.index {
        return (Cow::Borrowed(frame), request.column_types.clone());
    }
    let mut decls = Vec::with_capacity(request.column_types.len() + 1);
    decls.push(ColumnDecl {
        name: "index".to_string(),
        column_type: TargetColumnType::BigInteger,
    });
    decls.extend(request.column_types.iter().cloned());
    (Cow::Owned(frame.with_index_column()), decls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RowValues;

    #[test]
    fn fail_mode_refuses_existing_tables() {
        assert!(WritePlan::for_mode(WriteMode::Fail, true, "\"t\"").is_err());
        let plan = WritePlan::for_mode(WriteMode::Fail, false, "\"t\"").unwrap();
        assert!(plan.create_table && !plan.drop_table && !plan.delete_rows);
    }

    #[test]
    fn destructive_modes_only_touch_existing_tables() {
        let replace = WritePlan::for_mode(WriteMode::Replace, true, "t").unwrap();
        assert!(replace.drop_table && replace.create_table);
        let clear = WritePlan::for_mode(WriteMode::DeleteRows, true, "t").unwrap();
        assert!(clear.delete_rows && !clear.drop_table && !clear.create_table);
        let append = WritePlan::for_mode(WriteMode::Append, true, "t").unwrap();
        assert_eq!(
            append,
            WritePlan {
                drop_table: false,
                delete_rows: false,
                create_table: false
            }
        );
        let fresh = WritePlan::for_mode(WriteMode::Replace, false, "t").unwrap();
        assert!(fresh.create_table && !fresh.drop_table);
    }

    #[test]
    fn table_ref_lists_columns_in_order() {
        let table = TableRef::new(
            "public",
            "users",
            vec![TableColumn::new("id", "bigint"), TableColumn::new("name", "text")],
        );
        assert_eq!(table.column_names(), vec!["id", "name"]);
        assert!(table.column("name").is_some());
        assert!(table.column("missing").is_none());
    }

    #[test]
    fn index_column_is_prepended_on_request() {
        let frame = Frame::from_rows(["v"], vec![vec![RowValues::Int(9)]]).unwrap();
        let mut request = WriteRequest {
            schema: "main".into(),
            table: "t".into(),
            mode: WriteMode::Append,
            index: false,
            column_types: crate::type_mapper::map_columns(frame.columns()),
        };
        let (plain, decls) = prepare_write(&frame, &request);
        assert!(matches!(plain, Cow::Borrowed(_)));
        assert_eq!(decls.len(), 1);

        request.index = true;
        let (indexed, decls) = prepare_write(&frame, &request);
        assert_eq!(indexed.column_names(), vec!["index", "v"]);
        assert_eq!(decls[0].name, "index");
        assert_eq!(decls[0].column_type, TargetColumnType::BigInteger);
    }
}
