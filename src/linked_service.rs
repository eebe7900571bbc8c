//! The connection manager: settings plus a lazily created, pooled engine.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::engine::{Connector, DefaultConnector, Engine, PoolStatus};
use crate::error::DatasetError;
use crate::settings::LinkedServiceSettings;
use crate::types::ResourceKind;

/// Something that can hand out a live engine.
///
/// [`LinkedService`] is the production implementation; datasets only depend on this trait.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Create the engine if there is none. Idempotent.
    ///
    /// # Errors
    /// Propagates settings validation and engine construction failures.
    async fn connect(&self) -> Result<Arc<dyn Engine>, DatasetError>;

    /// Probe the database, reporting the outcome instead of failing.
    async fn test_connection(&self) -> (bool, String);

    /// Dispose the engine if there is one. Safe to repeat.
    fn close(&self);

    /// The active engine, if connected.
    fn engine(&self) -> Option<Arc<dyn Engine>>;
}

#[derive(Default)]
enum HandleState {
    #[default]
    Uninitialized,
    Active(Arc<dyn Engine>),
    Disposed,
}

impl HandleState {
    fn engine(&self) -> Option<Arc<dyn Engine>> {
        match self {
            HandleState::Active(engine) => Some(Arc::clone(engine)),
            HandleState::Uninitialized | HandleState::Disposed => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            HandleState::Uninitialized => "uninitialized",
            HandleState::Active(_) => "active",
            HandleState::Disposed => "disposed",
        }
    }
}

/// A reusable connection to one database.
pub struct LinkedService {
    settings: LinkedServiceSettings,
    connector: Arc<dyn Connector>,
    state: Mutex<HandleState>,
}

impl fmt::Debug for LinkedService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkedService")
            .field("settings", &self.settings)
            .field("connector", &self.connector)
            .field("state", &self.with_state(|state| state.name()))
            .finish()
    }
}

impl LinkedService {
    /// A linked service that picks its backend from the URI scheme.
    #[must_use]
    pub fn new(settings: LinkedServiceSettings) -> Self {
        Self::with_connector(settings, Arc::new(DefaultConnector))
    }

    #[must_use]
    pub fn with_connector(settings: LinkedServiceSettings, connector: Arc<dyn Connector>) -> Self {
        Self {
            settings,
            connector,
            state: Mutex::new(HandleState::Uninitialized),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &LinkedServiceSettings {
        &self.settings
    }

    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        ResourceKind::LinkedService
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.with_state(|state| matches!(state, HandleState::Active(_)))
    }

    /// Occupancy of the active pool, if connected.
    #[must_use]
    pub fn pool(&self) -> Option<PoolStatus> {
        self.engine().map(|engine| engine.status())
    }

    /// Every read or write of the handle state goes through here.
    fn with_state<R>(&self, f: impl FnOnce(&mut HandleState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

#[async_trait]
impl ConnectionProvider for LinkedService {
    async fn connect(&self) -> Result<Arc<dyn Engine>, DatasetError> {
        if let Some(engine) = self.engine() {
            return Ok(engine);
        }

        self.settings.validate()?;
        let created = self.connector.create_engine(&self.settings).await?;

        // Another caller may have connected while the engine was being built.
        let (engine, redundant) = self.with_state(|state| match state {
            HandleState::Active(existing) => (Arc::clone(existing), Some(created)),
            HandleState::Uninitialized | HandleState::Disposed => {
                *state = HandleState::Active(Arc::clone(&created));
                (created, None)
            }
        });
        match redundant {
            Some(extra) => extra.dispose(),
            None => info!(
                pool_size = self.settings.pool_size,
                max_overflow = self.settings.max_overflow,
                pool_timeout = self.settings.pool_timeout,
                pool_recycle = self.settings.pool_recycle,
                "connection pool created"
            ),
        }
        Ok(engine)
    }

    async fn test_connection(&self) -> (bool, String) {
        let engine = match self.connect().await {
            Ok(engine) => engine,
            Err(e) => {
                warn!(error = %e, "engine creation failed during connection test");
                return (false, format!("Failed to create engine: {e}"));
            }
        };
        match engine.probe().await {
            Ok(()) => (true, "Connection successfully tested".to_string()),
            Err(e) => {
                warn!(error = %e, "connection test failed");
                (false, format!("Connection test failed: {e}"))
            }
        }
    }

    fn close(&self) {
        let released = self.with_state(|state| match std::mem::take(state) {
            HandleState::Active(engine) => {
                *state = HandleState::Disposed;
                Some(engine)
            }
            previous => {
                *state = previous;
                None
            }
        });
        if let Some(engine) = released {
            engine.dispose();
            info!("connection pool closed");
        }
    }

    fn engine(&self) -> Option<Arc<dyn Engine>> {
        self.with_state(|state| state.engine())
    }
}
