use std::future::Future;
use std::sync::{PoisonError, RwLock};

use bb8::{ManageConnection, Pool, PooledConnection};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

use crate::error::DatasetError;
use crate::settings::LinkedServiceSettings;

/// bb8 manager for Postgres clients.
#[derive(Debug, Clone)]
pub struct PgManager {
    pub(crate) config: tokio_postgres::Config,
}

impl PgManager {
    #[must_use]
    pub fn new(config: tokio_postgres::Config) -> Self {
        Self { config }
    }
}

impl ManageConnection for PgManager {
    type Connection = Client;
    type Error = tokio_postgres::Error;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let cfg = self.config.clone();
        async move {
            debug!(
                hosts = ?cfg.get_hosts(),
                db = ?cfg.get_dbname(),
                user = ?cfg.get_user(),
                "opening postgres connection"
            );
            let (client, connection) = cfg.connect(NoTls).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    warn!(error = %e, "postgres connection closed with error");
                }
            });
            Ok(client)
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move { conn.simple_query("SELECT 1").await.map(|_| ()) }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_closed()
    }
}

/// A pooled PostgreSQL engine.
///
/// The pool connects lazily: building the engine validates the URI but opens no connection.
pub struct PostgresEngine {
    pool: RwLock<Option<Pool<PgManager>>>,
    max_size: u32,
}

impl std::fmt::Debug for PostgresEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresEngine")
            .field("max_size", &self.max_size)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl PostgresEngine {
    /// Build the pool described by `settings`.
    ///
    /// `pool_size + max_overflow` bounds the pool, `pool_timeout` bounds checkout and
    /// `pool_recycle` caps connection lifetime.
    ///
    /// # Errors
    /// Returns `DatasetError::ConfigError` if the URI cannot be parsed.
    pub fn from_settings(settings: &LinkedServiceSettings) -> Result<Self, DatasetError> {
        let config: tokio_postgres::Config = strip_driver(&settings.uri)
            .parse()
            .map_err(|e| DatasetError::ConfigError(format!("invalid PostgreSQL URI: {e}")))?;

        let max_size = settings.max_connections();
        let pool = Pool::builder()
            .max_size(max_size)
            .connection_timeout(settings.pool_timeout_duration())
            .max_lifetime(settings.pool_recycle_duration())
            .build_unchecked(PgManager::new(config));

        Ok(Self {
            pool: RwLock::new(Some(pool)),
            max_size,
        })
    }

    pub(crate) fn pool(&self) -> Result<Pool<PgManager>, DatasetError> {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                DatasetError::ConnectionError("postgres engine has been disposed".to_string())
            })
    }

    pub(crate) fn take_pool(&self) -> Option<Pool<PgManager>> {
        self.pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
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
}

/// Check out a client, mapping pool errors to connection errors.
pub(crate) async fn checkout(
    pool: &Pool<PgManager>,
) -> Result<PooledConnection<'_, PgManager>, DatasetError> {
    pool.get()
        .await
        .map_err(|e| DatasetError::ConnectionError(format!("postgres checkout error: {e}")))
}

/// `postgresql+driver://…` → `postgresql://…`
fn strip_driver(uri: &str) -> String {
    match uri.split_once("://") {
        Some((scheme, rest)) if scheme.contains('+') => {
            let base = scheme.split('+').next().unwrap_or(scheme);
            format!("{base}://{rest}")
        }
        _ => uri.to_string(),
    }
}
