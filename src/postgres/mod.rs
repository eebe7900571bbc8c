// PostgreSQL backend
//
// - config: bb8 connection manager and pool construction from linked-service settings
// - params: binding `RowValues` as tokio-postgres parameters
// - query: mapping result rows and column types into frames
// - executor: the `Engine` implementation

pub mod config;
pub mod executor;
pub mod params;
pub mod query;

pub use config::{PgManager, PostgresEngine};
pub use params::Params;
pub use query::{build_frame, dtype_for_type, postgres_extract_value};
