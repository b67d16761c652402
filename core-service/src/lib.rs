//! Core service façade.
//!
//! Wires configuration, the mirror database, the event bus and the registered
//! library adapters into the two entry points host applications use:
//! [`CoreService::refresh`] and [`CoreService::sync`].
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::CoreService;
//!
//! let config = CoreConfig::load(Path::new("djlib.toml"))?;
//! let core = CoreService::new(config).await?;
//! core.register_library(spotify_adapter).await?;
//! core.register_library(rekordbox_adapter).await?;
//! core.connect_all().await?;
//!
//! core.refresh_all().await;
//! let run = core.sync("spotify", "rekordbox").await?;
//! ```

pub mod connect;
pub mod error;

pub use error::{CoreError, Result};

use bridge_traits::catalog::CatalogAdapter;
use connect::{connect_with_retry, CONNECT_ATTEMPTS, CONNECT_PAUSE};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{LibraryId, Mirror};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use core_sync::{
    LockWindow, MirrorRefresher, RefreshStats, RetryPolicy, SqliteSyncRunRepository,
    SyncEndpoint, SyncOptions, SyncOrchestrator, SyncRun, SyncRunRepository,
};
use futures::future::{join_all, try_join_all};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

/// Subdirectory of the cache directory receiving per-run exports.
pub const EXPORT_DIR: &str = "exports";

const EVENT_BUFFER_SIZE: usize = 256;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<CoreConfig>,
    pool: SqlitePool,
    events: EventBus,
    runs: Arc<dyn SyncRunRepository>,
    libraries: Arc<RwLock<BTreeMap<String, SyncEndpoint>>>,
}

impl CoreService {
    /// Validate `config`, open the mirror database and prepare the cache
    /// directory.
    pub async fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.cache_dir)
            .await
            .map_err(|e| {
                CoreError::InitializationFailed(format!(
                    "Cannot create cache directory {}: {}",
                    config.cache_dir.display(),
                    e
                ))
            })?;

        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
        Ok(Self::with_pool(config, pool))
    }

    /// Build a service over an already migrated pool.
    pub fn with_pool(config: CoreConfig, pool: SqlitePool) -> Self {
        let runs = Arc::new(SqliteSyncRunRepository::new(pool.clone()));
        Self {
            config: Arc::new(config),
            pool,
            events: EventBus::new(EVENT_BUFFER_SIZE),
            runs,
            libraries: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to refresh and sync events emitted from now on.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    /// Register an adapter under its own name.
    ///
    /// The library gets its own mirror, retry policy (honoring any per-library
    /// override in the config) and lock window.
    pub async fn register_library(&self, adapter: Arc<dyn CatalogAdapter>) -> Result<()> {
        let name = adapter.name().to_string();
        let mut libraries = self.libraries.write().await;
        if libraries.contains_key(&name) {
            return Err(CoreError::DuplicateLibrary(name));
        }

        let endpoint = SyncEndpoint {
            adapter,
            mirror: Mirror::new(self.pool.clone(), LibraryId::new(name.clone())),
            retry: RetryPolicy::from(self.config.retry_for(&name)),
            lock: Arc::new(LockWindow::new(self.config.sync.lock_window())),
        };
        info!(library = %name, "Library registered");
        libraries.insert(name, endpoint);
        Ok(())
    }

    /// Registered library names, sorted.
    pub async fn libraries(&self) -> Vec<String> {
        self.libraries.read().await.keys().cloned().collect()
    }

    /// Local mirror of `library`.
    pub async fn mirror(&self, library: &str) -> Result<Mirror> {
        Ok(self.endpoint(library).await?.mirror)
    }

    /// Connect every registered adapter.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::ConnectFailed`] if any adapter stays
    /// unreachable after its retries.
    pub async fn connect_all(&self) -> Result<()> {
        let endpoints = self.endpoints().await;
        try_join_all(endpoints.iter().map(|endpoint| {
            connect_with_retry(endpoint.adapter.as_ref(), CONNECT_ATTEMPTS, CONNECT_PAUSE)
        }))
        .await?;
        info!(libraries = endpoints.len(), "All libraries connected");
        Ok(())
    }

    /// Close every registered adapter.
    ///
    /// Every adapter is closed even if an earlier one fails; the first
    /// failure is returned.
    pub async fn close_all(&self) -> Result<()> {
        let endpoints = self.endpoints().await;
        let results = join_all(endpoints.iter().map(|endpoint| endpoint.adapter.close())).await;

        let mut first_error = None;
        for (endpoint, result) in endpoints.iter().zip(results) {
            if let Err(e) = result {
                warn!(library = endpoint.library(), error = %e, "Failed to close adapter");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Refresh the mirror of one library from its adapter.
    #[instrument(skip(self))]
    pub async fn refresh(&self, library: &str) -> Result<RefreshStats> {
        let endpoint = self.endpoint(library).await?;
        let stats = self.refresher(&endpoint).refresh().await?;
        Ok(stats)
    }

    /// Refresh every registered library concurrently.
    ///
    /// One library failing does not stop the others.
    pub async fn refresh_all(&self) -> Vec<(String, Result<RefreshStats>)> {
        let endpoints = self.endpoints().await;
        join_all(endpoints.iter().map(|endpoint| async move {
            let result = self
                .refresher(endpoint)
                .refresh()
                .await
                .map_err(CoreError::from);
            (endpoint.library().to_string(), result)
        }))
        .await
    }

    /// Sync `source` into `target`.
    ///
    /// Returns the finished run, also recorded in the history.
    #[instrument(skip(self))]
    pub async fn sync(&self, source: &str, target: &str) -> Result<SyncRun> {
        if source == target {
            return Err(CoreError::SameLibrary(source.to_string()));
        }
        let source = self.endpoint(source).await?;
        let target = self.endpoint(target).await?;

        let options = SyncOptions {
            export_concurrency: self.config.sync.export_concurrency,
            import_concurrency: self.config.sync.import_concurrency,
            export_root: self.export_root(),
        };
        let run = SyncOrchestrator::new(self.runs.clone(), options)
            .with_event_bus(self.events.clone())
            .sync(&source, &target)
            .await?;
        Ok(run)
    }

    /// Most recent sync runs first.
    pub async fn history(&self, limit: u32) -> Result<Vec<SyncRun>> {
        Ok(self.runs.list_history(limit).await?)
    }

    /// Most recent sync runs involving `library`.
    pub async fn library_history(&self, library: &str, limit: u32) -> Result<Vec<SyncRun>> {
        Ok(self.runs.list_for_library(library, limit).await?)
    }

    /// Directory under which each sync run exports its files.
    pub fn export_root(&self) -> PathBuf {
        self.config.cache_dir.join(EXPORT_DIR)
    }

    fn refresher(&self, endpoint: &SyncEndpoint) -> MirrorRefresher {
        MirrorRefresher::new(endpoint.adapter.clone(), endpoint.mirror.clone())
            .with_concurrency(self.config.refresh_concurrency)
            .with_event_bus(self.events.clone())
    }

    async fn endpoint(&self, library: &str) -> Result<SyncEndpoint> {
        self.libraries
            .read()
            .await
            .get(library)
            .cloned()
            .ok_or_else(|| CoreError::UnknownLibrary(library.to_string()))
    }

    async fn endpoints(&self) -> Vec<SyncEndpoint> {
        self.libraries.read().await.values().cloned().collect()
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("database_path", &self.config.database_path)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}
