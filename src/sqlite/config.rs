use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use bb8::{ManageConnection, Pool, PooledConnection};
use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use crate::error::DatasetError;
use crate::settings::LinkedServiceSettings;

static MEMORY_DATABASES: AtomicU64 = AtomicU64::new(0);

/// Where a `sqlite:` URI points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteTarget {
    /// `sqlite://`, `sqlite::memory:` and `sqlite:///:memory:`
    Memory,
    File(PathBuf),
}

impl SqliteTarget {
    /// Parse a `sqlite[+driver]:` URI.
    ///
    /// `sqlite:///relative.db` names a path relative to the working directory and
    /// `sqlite:////abs/path.db` an absolute one.
    ///
    /// # Errors
    /// Returns `DatasetError::ConfigError` for non-`sqlite` URIs.
    pub fn parse(uri: &str) -> Result<Self, DatasetError> {
        let (scheme, rest) = uri
            .split_once(':')
            .ok_or_else(|| DatasetError::ConfigError(format!("invalid SQLite URI: {uri}")))?;
        if scheme.split('+').next() != Some("sqlite") {
            return Err(DatasetError::ConfigError(format!(
                "invalid SQLite URI: {uri}"
            )));
        }
        let rest = rest.split('?').next().unwrap_or_default();
        let path = match rest.strip_prefix("//") {
            Some(after_authority) => after_authority
                .strip_prefix('/')
                .unwrap_or(after_authority),
            None => rest,
        };
        if path.is_empty() || path == ":memory:" {
            Ok(SqliteTarget::Memory)
        } else {
            Ok(SqliteTarget::File(PathBuf::from(path)))
        }
    }
}

/// bb8 manager opening rusqlite connections to one database.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    path: String,
    flags: OpenFlags,
    busy_timeout: Duration,
    wal: bool,
}

impl ManageConnection for SqliteManager {
    type Connection = Connection;
    type Error = rusqlite::Error;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let manager = self.clone();
        async move {
            debug!(path = %manager.path, "opening sqlite connection");
            let conn = Connection::open_with_flags(&manager.path, manager.flags)?;
            conn.busy_timeout(manager.busy_timeout)?;
            if manager.wal {
                conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
            }
            Ok(conn)
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move { conn.query_row("SELECT 1", [], |_| Ok(())) }
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// A pooled `SQLite` engine.
///
/// In-memory targets use a uniquely named shared-cache database so every pooled connection
/// sees the same data. An anchor connection keeps it alive until the engine is disposed.
pub struct SqliteEngine {
    pool: RwLock<Option<Pool<SqliteManager>>>,
    anchor: Mutex<Option<Connection>>,
    target: SqliteTarget,
    max_size: u32,
}

impl std::fmt::Debug for SqliteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEngine")
            .field("target", &self.target)
            .field("max_size", &self.max_size)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl SqliteEngine {
    /// Build the pool described by `settings`. File databases are opened lazily; an
    /// in-memory database is created immediately.
    ///
    /// # Errors
    /// Returns `DatasetError::ConfigError` for a malformed URI or `DatasetError::SqliteError`
    /// if the in-memory database cannot be created.
    pub fn from_settings(settings: &LinkedServiceSettings) -> Result<Self, DatasetError> {
        let target = SqliteTarget::parse(&settings.uri)?;
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let (path, anchor, wal) = match &target {
            SqliteTarget::Memory => {
                let name = format!(
                    "file:sqlds-mem-{}-{}?mode=memory&cache=shared",
                    std::process::id(),
                    MEMORY_DATABASES.fetch_add(1, Ordering::Relaxed)
                );
                let anchor = Connection::open_with_flags(&name, flags)?;
                (name, Some(anchor), false)
            }
            SqliteTarget::File(path) => (path.to_string_lossy().into_owned(), None, true),
        };

        let max_size = settings.max_connections();
        let manager = SqliteManager {
            path,
            flags,
            busy_timeout: settings.pool_timeout_duration(),
            wal,
        };
        let pool = Pool::builder()
            .max_size(max_size)
            .connection_timeout(settings.pool_timeout_duration())
            .max_lifetime(settings.pool_recycle_duration())
            .build_unchecked(manager);

        Ok(Self {
            pool: RwLock::new(Some(pool)),
            anchor: Mutex::new(anchor),
            target,
            max_size,
        })
    }

    #[must_use]
    pub fn target(&self) -> &SqliteTarget {
        &self.target
    }

    pub(crate) fn pool(&self) -> Result<Pool<SqliteManager>, DatasetError> {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                DatasetError::ConnectionError("sqlite engine has been disposed".to_string())
            })
    }

    /// Drop the pool and the in-memory anchor. Returns whether anything was released.
    pub(crate) fn release(&self) -> bool {
        let pool = self
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let anchor = self
            .anchor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        pool.is_some() || anchor.is_some()
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    pub(crate) fn max_size(&self) -> u32 {
        self.max_size
    }

    /// Run `f` on a pooled connection on the blocking thread pool.
    pub(crate) async fn run_blocking<T, F>(&self, f: F) -> Result<T, DatasetError>
    where
        F: FnOnce(&mut Connection) -> Result<T, DatasetError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool()?;
        let mut conn: PooledConnection<'static, SqliteManager> = pool
            .get_owned()
            .await
            .map_err(|e| DatasetError::ConnectionError(format!("sqlite checkout error: {e}")))?;
        tokio::task::spawn_blocking(move || f(&mut *conn))
            .await
            .map_err(|e| DatasetError::ConnectionError(format!("sqlite worker failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_uris() {
        for uri in ["sqlite://", "sqlite::memory:", "sqlite:///:memory:", "sqlite+pysqlite://"] {
            assert_eq!(SqliteTarget::parse(uri).unwrap(), SqliteTarget::Memory, "{uri}");
        }
    }

    #[test]
    fn file_uris_distinguish_relative_and_absolute() {
        assert_eq!(
            SqliteTarget::parse("sqlite:///data/app.db").unwrap(),
            SqliteTarget::File(PathBuf::from("data/app.db"))
        );
        assert_eq!(
            SqliteTarget::parse("sqlite:////tmp/app.db?mode=rwc").unwrap(),
            SqliteTarget::File(PathBuf::from("/tmp/app.db"))
        );
    }

    #[test]
    fn other_schemes_are_rejected() {
        assert!(matches!(
            SqliteTarget::parse("postgresql://h/db"),
            Err(DatasetError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn memory_databases_are_shared_across_pooled_connections() {
        let settings = LinkedServiceSettings::builder("sqlite://").pool_size(2).finish();
        let engine = SqliteEngine::from_settings(&settings).unwrap();
        engine
            .run_blocking(|conn| {
                conn.execute_batch("CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (4);")?;
                Ok(())
            })
            .await
            .unwrap();
        let count: i64 = engine
            .run_blocking(|conn| Ok(conn.query_row("SELECT count(*) FROM t", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 1);

        assert!(engine.release());
        assert!(engine.is_disposed());
        assert!(engine.run_blocking(|_| Ok(())).await.is_err());
    }
}
