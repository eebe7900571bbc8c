// SQLite backend
//
// - config: URI parsing, the bb8 connection manager and the engine's pool
// - params: `RowValues` to rusqlite values
// - query: catalog lookups and chunked result extraction
// - executor: the `Engine` implementation, run on the blocking thread pool

pub mod config;
pub mod executor;
pub mod params;
pub mod query;

pub use config::{SqliteEngine, SqliteManager, SqliteTarget};
pub use params::Params;
pub use query::{dtype_for_declared, sqlite_extract_value};
