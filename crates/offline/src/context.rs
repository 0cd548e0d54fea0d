//! The offline layer wired together.

use std::sync::Arc;

use crate::cache::CatalogCache;
use crate::config::OfflineConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::operation::OperationPayload;
use crate::queue::PendingQueue;
use crate::remote::{HttpRemote, RemoteError, RemoteStore};
use crate::status::StatusIndicator;
use crate::store::{LocalStore, StoreError};
use crate::sync_engine::{DrainReport, SubmitOutcome, SyncEngine, SyncError};
use crate::sync_worker::{SyncWorker, SyncWorkerHandle};

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid backend URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid backend configuration: {0}")]
    Remote(#[from] RemoteError),
}

/// Owns every component of the offline layer.
///
/// Built once per process and shared by reference; cloning hands out the
/// same components.
#[derive(Clone)]
pub struct OfflineContext {
    config: OfflineConfig,
    remote: Arc<dyn RemoteStore>,
    cache: Arc<CatalogCache>,
    queue: PendingQueue,
    monitor: Arc<ConnectivityMonitor>,
    engine: Arc<SyncEngine>,
}

impl core::fmt::Debug for OfflineContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OfflineContext")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl OfflineContext {
    /// Build against the HTTP backend named in `config`.
    pub async fn connect(config: OfflineConfig) -> Result<Self, OpenError> {
        reqwest::Url::parse(&config.api_url).map_err(|e| OpenError::InvalidUrl {
            url: config.api_url.clone(),
            reason: e.to_string(),
        })?;
        let remote = HttpRemote::new(
            config.api_url.clone(),
            config.api_key.clone(),
            config.request_timeout,
        )?;
        Ok(Self::open(config, Arc::new(remote)).await?)
    }

    /// Open the on-disk database and wire components around `remote`.
    pub async fn open(config: OfflineConfig, remote: Arc<dyn RemoteStore>) -> Result<Self, StoreError> {
        let path = config.database_path().map_err(StoreError::Unavailable)?;
        tracing::info!(path = %path.display(), "opening local store");
        let store = LocalStore::open(&path).await?;
        Self::with_store(config, store, remote).await
    }

    /// Like [`open`](Self::open) but backed by a private in-memory database.
    pub async fn open_in_memory(config: OfflineConfig, remote: Arc<dyn RemoteStore>) -> Result<Self, StoreError> {
        let store = LocalStore::open_in_memory().await?;
        Self::with_store(config, store, remote).await
    }

    async fn with_store(
        config: OfflineConfig,
        store: LocalStore,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Self, StoreError> {
        let cache = Arc::new(CatalogCache::open(store.clone(), remote.clone(), config.catalog_collection.clone()).await?);
        let queue = PendingQueue::new(store);
        let monitor = Arc::new(ConnectivityMonitor::new(true));
        let engine = Arc::new(
            SyncEngine::new(queue.clone(), cache.clone(), remote.clone(), monitor.clone())
                .with_max_rejections(config.max_rejections),
        );

        Ok(Self {
            config,
            remote,
            cache,
            queue,
            monitor,
            engine,
        })
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CatalogCache> {
        &self.cache
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    pub fn status(&self) -> StatusIndicator {
        StatusIndicator::new(self.engine.clone(), self.queue.clone(), self.cache.clone())
    }

    pub async fn submit(&self, payload: OperationPayload) -> Result<SubmitOutcome, SyncError> {
        self.engine.submit(payload).await
    }

    pub async fn force_sync(&self) -> Result<DrainReport, SyncError> {
        self.engine.force_sync().await
    }

    /// Start the probe/reconnect worker with the configured interval.
    pub fn spawn_worker(&self) -> SyncWorkerHandle {
        SyncWorker::new(
            self.engine.clone(),
            self.monitor.clone(),
            self.remote.clone(),
            self.queue.clone(),
        )
        .with_probe_interval(self.config.probe_interval)
        .start()
    }
}
