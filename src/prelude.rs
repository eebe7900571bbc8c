//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and traits
//! to make it easier to get started with the library.

pub use crate::dataset::{Dataset, TabularResource};
pub use crate::engine::{Connector, DefaultConnector, Engine, PoolStatus};
pub use crate::error::DatasetError;
pub use crate::frame::{Column, Frame, SchemaMap};
pub use crate::linked_service::{ConnectionProvider, LinkedService};
pub use crate::settings::{
    CreateSettings, DatasetSettings, LinkedServiceSettings, OrderBy, ReadSettings, SortDirection,
    WriteMode,
};
pub use crate::types::{DType, DatabaseType, RowValues};
