//! A single worker version.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chartcache_net::Fetcher;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::control::{purge_list_entries, ControlMessage, MessageOutcome};
use crate::event::{FetchEvent, FetchOutcome, ServiceWorkerEvent, WorkerId};
use crate::lifecycle::{self, WorkerState};
use crate::store::CacheStorage;
use crate::strategy::StrategyEngine;
use crate::{Result, ServiceWorkerError};

/// Host resources every worker runs against.
#[derive(Clone)]
pub struct HostBindings {
    pub storage: Arc<dyn CacheStorage>,
    pub fetcher: Arc<dyn Fetcher>,
    pub clock: Arc<dyn Clock>,
}

impl HostBindings {
    /// Bind a store and a network, using the system clock.
    pub fn new(storage: Arc<dyn CacheStorage>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            storage,
            fetcher,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// A worker instance, pinned to one [`CacheConfig`].
pub struct ServiceWorker {
    id: WorkerId,
    config: Arc<CacheConfig>,
    engine: StrategyEngine,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
    events: mpsc::UnboundedSender<ServiceWorkerEvent>,
}

impl ServiceWorker {
    pub(crate) fn new(
        config: CacheConfig,
        bindings: &HostBindings,
        events: mpsc::UnboundedSender<ServiceWorkerEvent>,
    ) -> Self {
        let config = Arc::new(config);
        let engine = StrategyEngine::new(
            Arc::clone(&config),
            Arc::clone(&bindings.storage),
            Arc::clone(&bindings.fetcher),
            Arc::clone(&bindings.clock),
        );
        Self {
            id: WorkerId::new(),
            config,
            engine,
            storage: Arc::clone(&bindings.storage),
            fetcher: Arc::clone(&bindings.fetcher),
            state: RwLock::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            events,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Version label: the precache partition name.
    pub fn version(&self) -> &str {
        &self.config.precache_name
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    pub async fn is_activated(&self) -> bool {
        self.state().await == WorkerState::Activated
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Ask to be activated as soon as installed.
    pub fn request_skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    /// Precache the manifest.
    ///
    /// On failure the worker becomes redundant and none of its writes are kept.
    pub async fn install(&self) -> Result<usize> {
        self.transition(WorkerState::Installing).await?;
        info!(worker = %self.id, version = self.version(), "Installing");

        match lifecycle::precache(&self.config, self.storage.as_ref(), self.fetcher.as_ref()).await
        {
            Ok(stored) => {
                self.transition(WorkerState::Installed).await?;
                self.request_skip_waiting();
                Ok(stored)
            }
            Err(e) => {
                warn!(worker = %self.id, error = %e, "Install failed");
                self.mark_redundant().await;
                Err(e)
            }
        }
    }

    /// Sweep stale partitions and take control.
    ///
    /// Returns the partitions deleted. A failed sweep is logged; the worker
    /// activates regardless. The version is recorded in the store once
    /// activated, so a later run can resume it.
    pub async fn activate(&self) -> Result<Vec<String>> {
        self.transition(WorkerState::Activating).await?;

        let deleted = match lifecycle::sweep(&self.config, self.storage.as_ref()).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(worker = %self.id, error = %e, "Partition sweep failed");
                Vec::new()
            }
        };

        self.transition(WorkerState::Activated).await?;
        if let Err(e) = self.storage.set_active_version(self.version()).await {
            warn!(worker = %self.id, error = %e, "Failed to record activated version");
        }
        info!(worker = %self.id, version = self.version(), "Activated");
        Ok(deleted)
    }

    /// Resume a version that was already activated in an earlier run.
    pub(crate) async fn restore_activated(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if *state != WorkerState::Parsed {
            return Err(ServiceWorkerError::StateError(format!(
                "cannot restore a worker in state {}",
                *state
            )));
        }
        *state = WorkerState::Activated;
        drop(state);

        info!(worker = %self.id, version = self.version(), "Restored");
        self.emit_state(WorkerState::Activated);
        Ok(())
    }

    /// Retire the worker. No-op if already redundant.
    pub async fn mark_redundant(&self) {
        let mut state = self.state.write().await;
        if *state == WorkerState::Redundant {
            return;
        }
        *state = WorkerState::Redundant;
        drop(state);

        debug!(worker = %self.id, "Redundant");
        self.emit_state(WorkerState::Redundant);
    }

    /// Only an activated worker intercepts requests.
    pub async fn handle_fetch(&self, event: &FetchEvent) -> FetchOutcome {
        if !self.is_activated().await {
            return FetchOutcome::Passthrough;
        }
        self.engine.handle_fetch(event).await
    }

    /// Handle a message posted by a page.
    pub async fn handle_message(&self, payload: &Value) -> Result<MessageOutcome> {
        if self.state().await == WorkerState::Redundant {
            return Err(ServiceWorkerError::StateError(
                "cannot post message to redundant worker".to_string(),
            ));
        }

        match ControlMessage::parse(payload) {
            Some(ControlMessage::SkipWaiting) => {
                self.request_skip_waiting();
                Ok(MessageOutcome::SkipWaitingRequested)
            }
            Some(ControlMessage::ClearSongsCache) => {
                let removed = purge_list_entries(
                    self.engine.classifier(),
                    self.storage.as_ref(),
                    &self.config.runtime_name,
                )
                .await?;
                let _ = self.events.send(ServiceWorkerEvent::CachePurged {
                    partition: self.config.runtime_name.clone(),
                    removed,
                });
                Ok(MessageOutcome::Purged { removed })
            }
            None => Ok(MessageOutcome::Ignored),
        }
    }

    pub(crate) async fn transition(&self, next: WorkerState) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.can_transition_to(next) {
            return Err(ServiceWorkerError::StateError(format!(
                "{} cannot move from {} to {}",
                self.id, *state, next
            )));
        }
        *state = next;
        drop(state);

        self.emit_state(next);
        Ok(())
    }

    fn emit_state(&self, new_state: WorkerState) {
        let _ = self.events.send(ServiceWorkerEvent::StateChange {
            worker_id: self.id,
            version: self.config.precache_name.clone(),
            new_state,
        });
    }
}

impl std::fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("id", &self.id)
            .field("version", &self.config.precache_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCacheStorage;
    use crate::test_support::{test_config, MockFetcher};
    use http::StatusCode;
    use serde_json::json;

    struct Fixture {
        worker: ServiceWorker,
        storage: Arc<MemoryCacheStorage>,
        fetcher: Arc<MockFetcher>,
        events: mpsc::UnboundedReceiver<ServiceWorkerEvent>,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(MemoryCacheStorage::new());
        let fetcher = Arc::new(MockFetcher::new());
        let (tx, events) = mpsc::unbounded_channel();
        let bindings = HostBindings::new(storage.clone(), fetcher.clone());
        Fixture {
            worker: ServiceWorker::new(test_config(), &bindings, tx),
            storage,
            fetcher,
            events,
        }
    }

    fn serve_manifest(fetcher: &MockFetcher) {
        for path in ["", "index.html", "favicon.svg", "default-cover.png"] {
            fetcher.respond(&format!("https://app.example/{path}"), StatusCode::OK, "x");
        }
    }

    fn states(events: &mut mpsc::UnboundedReceiver<ServiceWorkerEvent>) -> Vec<WorkerState> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ServiceWorkerEvent::StateChange { new_state, .. } = event {
                seen.push(new_state);
            }
        }
        seen
    }

    #[tokio::test]
    async fn test_install_then_activate() {
        let mut f = fixture();
        serve_manifest(&f.fetcher);

        assert_eq!(f.worker.install().await.unwrap(), 4);
        assert!(f.worker.skip_waiting_requested());
        f.worker.activate().await.unwrap();

        assert!(f.worker.is_activated().await);
        assert_eq!(
            f.storage.active_version().await.unwrap().as_deref(),
            Some("lesongs-v1")
        );
        assert_eq!(
            states(&mut f.events),
            vec![
                WorkerState::Installing,
                WorkerState::Installed,
                WorkerState::Activating,
                WorkerState::Activated,
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_install_is_redundant() {
        let mut f = fixture();
        serve_manifest(&f.fetcher);
        f.fetcher.fail("https://app.example/index.html");

        assert!(f.worker.install().await.is_err());
        assert_eq!(f.worker.state().await, WorkerState::Redundant);
        assert!(!f.worker.skip_waiting_requested());
        assert_eq!(
            states(&mut f.events),
            vec![WorkerState::Installing, WorkerState::Redundant]
        );
        assert!(f.worker.activate().await.is_err());
        assert_eq!(f.storage.active_version().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fetch_passes_through_until_activated() {
        let f = fixture();
        f.fetcher.respond("https://app.example/app.js", StatusCode::OK, "js");

        let outcome = f.worker.handle_fetch(&FetchEvent::get("https://app.example/app.js")).await;

        assert!(matches!(outcome, FetchOutcome::Passthrough));
        assert_eq!(f.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_restore_skips_install() {
        let f = fixture();
        f.fetcher.respond("https://app.example/app.js", StatusCode::OK, "js");

        f.worker.restore_activated().await.unwrap();
        let outcome = f.worker.handle_fetch(&FetchEvent::get("https://app.example/app.js")).await;

        assert_eq!(outcome.into_response().unwrap().text().unwrap(), "js");
        assert!(f.worker.restore_activated().await.is_err());
    }

    #[tokio::test]
    async fn test_messages() {
        let mut f = fixture();
        f.worker.restore_activated().await.unwrap();
        let _ = states(&mut f.events);

        let outcome = f.worker.handle_message(&json!({"type": "SKIP_WAITING"})).await.unwrap();
        assert_eq!(outcome, MessageOutcome::SkipWaitingRequested);
        assert!(f.worker.skip_waiting_requested());

        let outcome = f.worker.handle_message(&json!({"type": "NOPE"})).await.unwrap();
        assert_eq!(outcome, MessageOutcome::Ignored);

        let outcome = f
            .worker
            .handle_message(&json!({"type": "CLEAR_SONGS_CACHE"}))
            .await
            .unwrap();
        assert_eq!(outcome, MessageOutcome::Purged { removed: 0 });
        assert!(!f.storage.has("lesongs-runtime").await.unwrap());
        assert_eq!(
            f.events.try_recv().unwrap(),
            ServiceWorkerEvent::CachePurged {
                partition: "lesongs-runtime".to_string(),
                removed: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_redundant_worker_rejects_messages() {
        let f = fixture();
        f.worker.mark_redundant().await;
        f.worker.mark_redundant().await;

        let result = f.worker.handle_message(&json!({"type": "SKIP_WAITING"})).await;
        assert!(matches!(result, Err(ServiceWorkerError::StateError(_))));
    }
}
