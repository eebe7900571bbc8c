use indexmap::IndexMap;

use crate::error::DatasetError;
use crate::types::{DType, RowValues};

mod json;

/// Column name to logical type name in column order, derived after every successful read or
/// write.
pub type SchemaMap = IndexMap<String, String>;

/// A named, typed column of a [`Frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub dtype: DType,
}

impl Column {
    #[must_use]
    pub fn new(name: impl Into<String>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

/// In-memory table: ordered typed columns plus row-major values.
///
/// This is what a dataset holds as its `input` before a write and its `output` after a read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<Column>,
    rows: Vec<Vec<RowValues>>,
}

impl Frame {
    /// An empty frame with the given columns.
    #[must_use]
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a frame with explicit column types.
    ///
    /// # Errors
    /// Returns `DatasetError::ConversionError` if a row's width does not match the columns.
    pub fn with_dtypes(
        columns: Vec<Column>,
        rows: Vec<Vec<RowValues>>,
    ) -> Result<Self, DatasetError> {
        let mut frame = Frame::new(columns);
        frame.rows.reserve(rows.len());
        for row in rows {
            frame.push_row(row)?;
        }
        Ok(frame)
    }

    /// Build a frame and infer each column's type from its values.
    ///
    /// # Errors
    /// Returns `DatasetError::ConversionError` if a row's width does not match the names.
    pub fn from_rows<S: Into<String>>(
        names: impl IntoIterator<Item = S>,
        rows: Vec<Vec<RowValues>>,
    ) -> Result<Self, DatasetError> {
        let columns = names
            .into_iter()
            .map(|name| Column::new(name, DType::Null))
            .collect();
        let mut frame = Frame::with_dtypes(columns, rows)?;
        frame.infer_dtypes();
        Ok(frame)
    }

    /// Append a row.
    ///
    /// # Errors
    /// Returns `DatasetError::ConversionError` if the row width does not match the columns.
    pub fn push_row(&mut self, row: Vec<RowValues>) -> Result<(), DatasetError> {
        if row.len() != self.columns.len() {
            return Err(DatasetError::ConversionError(format!(
                "row has {} values but the frame has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Recompute every column type from the values it holds.
    pub fn infer_dtypes(&mut self) {
        for (idx, column) in self.columns.iter_mut().enumerate() {
            column.dtype = self
                .rows
                .iter()
                .map(|row| row[idx].dtype())
                .fold(DType::Null, DType::unify);
        }
    }

    /// Concatenate chunks that share the same column names, preserving row order.
    ///
    /// A column typed `null` in an early chunk takes its type from later chunks.
    ///
    /// # Errors
    /// Returns `DatasetError::ConversionError` if the chunks disagree on column names.
    pub fn concat(chunks: Vec<Frame>) -> Result<Frame, DatasetError> {
        let mut chunks = chunks.into_iter();
        let Some(mut combined) = chunks.next() else {
            return Ok(Frame::default());
        };
        for chunk in chunks {
            if chunk.column_names() != combined.column_names() {
                return Err(DatasetError::ConversionError(format!(
                    "cannot concatenate chunks with columns {:?} and {:?}",
                    combined.column_names(),
                    chunk.column_names()
                )));
            }
            for (target, column) in combined.columns.iter_mut().zip(&chunk.columns) {
                if target.dtype == DType::Null {
                    target.dtype = column.dtype;
                }
            }
            combined.rows.extend(chunk.rows);
        }
        Ok(combined)
    }

    /// Copy of this frame with a leading `index` column holding each row's position.
    #[must_use]
    pub fn with_index_column(&self) -> Frame {
        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        columns.push(Column::new("index", DType::Int64));
        columns.extend(self.columns.iter().cloned());

        let rows = self
            .rows
            .iter()
            .zip(0_i64..)
            .map(|(row, position)| {
                let mut with_index = Vec::with_capacity(row.len() + 1);
                with_index.push(RowValues::Int(position));
                with_index.extend(row.iter().cloned());
                with_index
            })
            .collect();

        Frame { columns, rows }
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<RowValues>] {
        &self.rows
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// True when the frame has no rows or no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }

    /// Value at `row` in the named column.
    #[must_use]
    pub fn get(&self, row: usize, column: &str) -> Option<&RowValues> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// All values of the named column, top to bottom.
    #[must_use]
    pub fn column_values(&self, column: &str) -> Option<Vec<&RowValues>> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Column name to logical type name.
    ///
    /// Columns with no declared type are typed from their values first.
    #[must_use]
    pub fn schema(&self) -> SchemaMap {
        self.columns
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let dtype = match column.dtype {
                    DType::Null => self
                        .rows
                        .iter()
                        .map(|row| row[idx].dtype())
                        .fold(DType::Null, DType::unify),
                    dtype => dtype,
                };
                (column.name.clone(), dtype.name().to_string())
            })
            .collect()
    }
}
