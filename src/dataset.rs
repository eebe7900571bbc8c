//! Table-level reads and writes against one `{schema, table}` through a linked service.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::dialect::Dialect;
use crate::engine::{Engine, WriteRequest};
use crate::error::{CreateErrorDetails, DatasetError, ReadErrorDetails};
use crate::frame::{Frame, SchemaMap};
use crate::linked_service::{ConnectionProvider, LinkedService};
use crate::query_builder::build_select;
use crate::settings::DatasetSettings;
use crate::type_mapper::map_columns;
use crate::types::ResourceKind;

/// Rows fetched per chunk during `read()`.
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// A resource exposing table-level operations.
#[async_trait]
pub trait TabularResource: Send {
    /// Load the table (narrowed by the read settings) into the output frame.
    ///
    /// # Errors
    /// Fails when not connected, on unknown columns or tables, and on execution failure.
    async fn read(&mut self) -> Result<(), DatasetError>;

    /// Write the input frame into the table according to the create settings.
    ///
    /// # Errors
    /// Fails when not connected, when the input is empty, and on execution failure.
    async fn create(&mut self) -> Result<(), DatasetError>;

    /// # Errors
    /// Not supported.
    async fn delete(&mut self) -> Result<(), DatasetError>;

    /// # Errors
    /// Not supported.
    async fn update(&mut self) -> Result<(), DatasetError>;

    /// # Errors
    /// Not supported.
    async fn rename(&mut self, new_name: &str) -> Result<(), DatasetError>;

    fn close(&mut self);
}

/// A configured view over one table.
///
/// Holds the last input written and output read plus the schema derived from them. The engine
/// belongs to the linked service; a dataset never creates or disposes one itself.
#[derive(Debug)]
pub struct Dataset<P: ConnectionProvider = LinkedService> {
    linked_service: Arc<P>,
    settings: DatasetSettings,
    input: Option<Frame>,
    output: Option<Frame>,
    schema: Option<SchemaMap>,
    next: bool,
    chunk_size: usize,
}

impl<P: ConnectionProvider> Dataset<P> {
    #[must_use]
    pub fn new(linked_service: Arc<P>, settings: DatasetSettings) -> Self {
        Self {
            linked_service,
            settings,
            input: None,
            output: None,
            schema: None,
            next: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Override the number of rows fetched per chunk. Values below 1 are treated as 1.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        ResourceKind::Dataset
    }

    #[must_use]
    pub fn linked_service(&self) -> &Arc<P> {
        &self.linked_service
    }

    #[must_use]
    pub fn settings(&self) -> &DatasetSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut DatasetSettings {
        &mut self.settings
    }

    #[must_use]
    pub fn input(&self) -> Option<&Frame> {
        self.input.as_ref()
    }

    pub fn set_input(&mut self, input: Frame) {
        self.input = Some(input);
    }

    pub fn clear_input(&mut self) {
        self.input = None;
    }

    #[must_use]
    pub fn output(&self) -> Option<&Frame> {
        self.output.as_ref()
    }

    /// Consume the dataset's last output.
    pub fn take_output(&mut self) -> Option<Frame> {
        self.output.take()
    }

    #[must_use]
    pub fn schema(&self) -> Option<&SchemaMap> {
        self.schema.as_ref()
    }

    /// Whether another `read()` may yield more data. Cleared once a read completes.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.next
    }

    fn active_engine(&self) -> Result<Arc<dyn Engine>, DatasetError> {
        self.linked_service.engine().ok_or_else(|| {
            DatasetError::ConnectionError("Connection pool is not initialized.".to_string())
        })
    }

    fn schema_name(&self, dialect: Dialect) -> String {
        self.settings
            .schema
            .clone()
            .unwrap_or_else(|| dialect.default_schema().to_string())
    }

    fn read_error(&self, schema: &str, query: String, source: DatasetError) -> DatasetError {
        DatasetError::ReadError {
            message: format!("Failed to read data from table: {source}"),
            status_code: 500,
            details: Box::new(ReadErrorDetails {
                table: self.settings.table.clone(),
                schema: schema.to_string(),
                query,
                settings: self.settings.read.clone(),
            }),
            source: Box::new(source),
        }
    }

    fn create_error(
        &self,
        schema: &str,
        message: String,
        status_code: u16,
        source: Option<DatasetError>,
    ) -> DatasetError {
        DatasetError::CreateError {
            message,
            status_code,
            details: Box::new(CreateErrorDetails {
                table: self.settings.table.clone(),
                schema: schema.to_string(),
                settings: self.settings.create,
            }),
            source: source.map(Box::new),
        }
    }
}

#[async_trait]
impl<P: ConnectionProvider> TabularResource for Dataset<P> {
    async fn read(&mut self) -> Result<(), DatasetError> {
        let engine = self.active_engine()?;
        let schema = self.schema_name(engine.dialect());

        let table = match engine.reflect_table(&schema, &self.settings.table).await {
            Ok(table) => table,
            Err(e @ DatasetError::TableNotFound { .. }) => return Err(e),
            Err(e) => return Err(self.read_error(&schema, String::new(), e)),
        };
        let statement = build_select(&table, self.settings.read.as_ref())?;
        let rendered = statement.render(engine.dialect());
        debug!(sql = %rendered.sql, params = rendered.params.len(), "reading table");

        let chunks = match engine.fetch_chunks(&statement, self.chunk_size).await {
            Ok(chunks) => chunks,
            Err(e) => return Err(self.read_error(&schema, rendered.sql, e)),
        };
        let frame =
            Frame::concat(chunks).map_err(|e| self.read_error(&schema, rendered.sql.clone(), e))?;

        debug!(rows = frame.num_rows(), columns = frame.num_columns(), "read complete");
        self.schema = Some(frame.schema());
        self.output = Some(frame);
        self.next = false;
        Ok(())
    }

    async fn create(&mut self) -> Result<(), DatasetError> {
        let engine = self.active_engine()?;
        let schema = self.schema_name(engine.dialect());

        let input = match self.input.as_ref() {
            Some(input) if !input.is_empty() => input,
            _ => {
                return Err(self.create_error(
                    &schema,
                    "Input is empty or None.".to_string(),
                    400,
                    None,
                ));
            }
        };

        let create = self.settings.create.unwrap_or_default();
        let request = WriteRequest {
            schema: schema.clone(),
            table: self.settings.table.clone(),
            mode: create.mode,
            index: create.index,
            column_types: map_columns(input.columns()),
        };
        debug!(
            table = %request.table,
            schema = %request.schema,
            mode = request.mode.as_str(),
            rows = input.num_rows(),
            "writing table"
        );

        if let Err(e) = engine.write_frame(input, &request).await {
            let message = format!("Failed to write data to table: {e}");
            return Err(self.create_error(&schema, message, 500, Some(e)));
        }

        self.schema = Some(input.schema());
        self.output = self.input.clone();
        Ok(())
    }

    async fn delete(&mut self) -> Result<(), DatasetError> {
        Err(DatasetError::Unsupported(
            "delete is not supported for SQL datasets".to_string(),
        ))
    }

    async fn update(&mut self) -> Result<(), DatasetError> {
        Err(DatasetError::Unsupported(
            "update is not supported for SQL datasets".to_string(),
        ))
    }

    async fn rename(&mut self, _new_name: &str) -> Result<(), DatasetError> {
        Err(DatasetError::Unsupported(
            "rename is not supported for SQL datasets".to_string(),
        ))
    }

    fn close(&mut self) {
        self.linked_service.close();
    }
}
