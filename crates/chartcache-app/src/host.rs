//! Binds a registration to the durable store and the real network.

use std::sync::Arc;

use anyhow::Context;
use chartcache_net::{Fetcher, ResourceLoader};
use chartcache_store_sqlite::SqliteCacheStorage;
use chartcache_sw::{
    CacheStorage, HostBindings, ServiceWorker, ServiceWorkerEvent, ServiceWorkerRegistration,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::AppConfig;

pub struct Host {
    pub config: AppConfig,
    pub registration: ServiceWorkerRegistration,
    pub storage: Arc<SqliteCacheStorage>,
    pub fetcher: Arc<ResourceLoader>,
    events: mpsc::UnboundedReceiver<ServiceWorkerEvent>,
}

impl Host {
    /// Open the store and build an empty registration for the configured origin.
    pub fn open(config: AppConfig) -> anyhow::Result<Self> {
        let database = config.database_path();
        if let Some(parent) = database.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }

        let storage = Arc::new(
            SqliteCacheStorage::new(&database)
                .with_context(|| format!("cannot open {}", database.display()))?,
        );
        let fetcher = Arc::new(ResourceLoader::new(config.network.loader_config())?);

        let bindings = HostBindings::new(storage.clone(), fetcher.clone());
        let (registration, events) =
            ServiceWorkerRegistration::new(config.cache.origin.clone(), bindings);

        Ok(Self {
            config,
            registration,
            storage,
            fetcher,
            events,
        })
    }

    /// Run a fresh install of the configured version.
    pub async fn install(&self) -> anyhow::Result<Arc<ServiceWorker>> {
        let worker = self.registration.create_worker(self.config.cache.clone())?;
        self.registration
            .update(Arc::clone(&worker))
            .await
            .with_context(|| format!("install of {} failed", worker.version()))?;
        Ok(worker)
    }

    /// Bring up an active worker: resume the configured version if an earlier
    /// run activated it, otherwise install it.
    pub async fn start(&self) -> anyhow::Result<Arc<ServiceWorker>> {
        let version = &self.config.cache.precache_name;
        let activated = self.storage.active_version().await?;
        if activated.as_deref() == Some(version.as_str()) {
            debug!(version = %version, "Resuming activated version");
            return Ok(self.registration.restore(self.config.cache.clone()).await?);
        }
        info!(version = %version, previous = ?activated, "Version not activated, installing");
        self.install().await
    }

    /// The host's own network, used for requests the worker does not intercept.
    pub fn network(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    /// Drain and log the events emitted so far.
    pub fn flush_events(&mut self) -> Vec<ServiceWorkerEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            debug!(?event, "Service worker event");
            drained.push(event);
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartcache_sw::{CacheConfig, WorkerState};
    use tempfile::tempdir;
    use url::Url;

    /// A host whose origin refuses every connection.
    fn offline_host(dir: &std::path::Path) -> Host {
        let config = AppConfig {
            cache: CacheConfig::for_app("lesongs", 1, Url::parse("http://127.0.0.1:1/").unwrap()),
            database_path: Some(dir.join("cache.db")),
            ..AppConfig::default()
        };
        Host::open(config).unwrap()
    }

    #[tokio::test]
    async fn test_start_resumes_activated_version() {
        let dir = tempdir().unwrap();
        let host = offline_host(dir.path());
        host.storage.set_active_version("lesongs-v1").await.unwrap();

        let worker = host.start().await.unwrap();

        assert_eq!(worker.state().await, WorkerState::Activated);
        assert!(host.registration.active().await.is_some());
    }

    #[tokio::test]
    async fn test_start_ignores_leftover_partition() {
        let dir = tempdir().unwrap();
        let host = offline_host(dir.path());
        host.storage.open("lesongs-v1").await.unwrap();

        assert!(host.start().await.is_err());
        assert!(host.registration.active().await.is_none());
        assert_eq!(host.storage.active_version().await.unwrap(), None);
    }
}
