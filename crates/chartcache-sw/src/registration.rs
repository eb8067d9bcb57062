//! Registration: the installing, waiting and active workers of one scope,
//! and the clients they control.

use std::sync::Arc;

use chartcache_net::Response;
use hashbrown::HashMap;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use url::Url;

use crate::config::CacheConfig;
use crate::control::MessageOutcome;
use crate::event::{FetchEvent, ServiceWorkerEvent, WorkerId};
use crate::worker::{HostBindings, ServiceWorker};
use crate::{Result, ServiceWorkerError};

// ==================== Clients ====================

/// A page under the registration's scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: String,
    pub url: Url,
    /// Controlling worker, if any.
    pub controller: Option<WorkerId>,
}

impl Client {
    pub fn new(id: impl Into<String>, url: Url) -> Self {
        Self {
            id: id.into(),
            url,
            controller: None,
        }
    }
}

/// Open clients, by id.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// All clients, or only controlled ones. Sorted by id.
    pub fn match_all(&self, include_uncontrolled: bool) -> Vec<&Client> {
        let mut matched: Vec<&Client> = self
            .clients
            .values()
            .filter(|c| include_uncontrolled || c.controller.is_some())
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        matched
    }

    /// Take control of every client in scope. Returns the ids whose controller changed.
    pub fn claim(&mut self, worker_id: WorkerId, scope: &Url) -> Vec<String> {
        let mut changed: Vec<String> = self
            .clients
            .values_mut()
            .filter(|c| c.url.as_str().starts_with(scope.as_str()))
            .filter(|c| c.controller != Some(worker_id))
            .map(|c| {
                c.controller = Some(worker_id);
                c.id.clone()
            })
            .collect();
        changed.sort();
        changed
    }

    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

// ==================== Registration ====================

/// Worker slot of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerSlot {
    Installing,
    Waiting,
    Active,
}

#[derive(Debug, Default)]
struct Slots {
    installing: Option<Arc<ServiceWorker>>,
    waiting: Option<Arc<ServiceWorker>>,
    active: Option<Arc<ServiceWorker>>,
}

/// Host-facing entry point: routes fetches and messages to the right worker
/// and moves workers through install and activation.
pub struct ServiceWorkerRegistration {
    scope: Url,
    bindings: HostBindings,
    slots: RwLock<Slots>,
    clients: RwLock<Clients>,
    event_tx: mpsc::UnboundedSender<ServiceWorkerEvent>,
}

impl ServiceWorkerRegistration {
    /// Create a registration and the receiver for its events.
    pub fn new(
        scope: Url,
        bindings: HostBindings,
    ) -> (Self, mpsc::UnboundedReceiver<ServiceWorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                scope,
                bindings,
                slots: RwLock::new(Slots::default()),
                clients: RwLock::new(Clients::new()),
                event_tx,
            },
            event_rx,
        )
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    /// Build a worker for `config`. The worker is not installed yet.
    pub fn create_worker(&self, config: CacheConfig) -> Result<Arc<ServiceWorker>> {
        config.validate()?;
        if config.origin.origin() != self.scope.origin() {
            return Err(ServiceWorkerError::Config(format!(
                "origin {} is outside scope {}",
                config.origin, self.scope
            )));
        }
        Ok(Arc::new(ServiceWorker::new(
            config,
            &self.bindings,
            self.event_tx.clone(),
        )))
    }

    /// Install `worker`. If it asks to skip waiting, activate it right away.
    ///
    /// A failed install leaves the active worker in control.
    pub async fn update(&self, worker: Arc<ServiceWorker>) -> Result<()> {
        let replaced = self.slots.write().await.installing.replace(Arc::clone(&worker));
        if let Some(replaced) = replaced {
            replaced.mark_redundant().await;
        }

        let installed = worker.install().await;

        let mut slots = self.slots.write().await;
        if slots
            .installing
            .as_ref()
            .is_some_and(|w| Arc::ptr_eq(w, &worker))
        {
            slots.installing = None;
        }
        installed?;

        let previous = slots.waiting.replace(Arc::clone(&worker));
        drop(slots);
        if let Some(previous) = previous {
            previous.mark_redundant().await;
        }

        if worker.skip_waiting_requested() {
            self.activate_waiting().await?;
        }
        Ok(())
    }

    /// Promote the waiting worker. `false` if nothing was waiting.
    pub async fn activate_waiting(&self) -> Result<bool> {
        let Some(worker) = self.slots.write().await.waiting.take() else {
            return Ok(false);
        };

        worker.activate().await?;
        self.promote(worker).await;
        Ok(true)
    }

    /// Resume an already-activated version without installing it again.
    pub async fn restore(&self, config: CacheConfig) -> Result<Arc<ServiceWorker>> {
        let worker = self.create_worker(config)?;
        worker.restore_activated().await?;
        self.promote(Arc::clone(&worker)).await;
        Ok(worker)
    }

    /// Route a page request. `None` means the host performs it natively.
    pub async fn fetch(&self, event: &FetchEvent) -> Option<Response> {
        let worker = self.active().await?;
        worker.handle_fetch(event).await.into_response()
    }

    /// Deliver a page message to the worker in `target`.
    pub async fn post_message(&self, target: WorkerSlot, payload: &Value) -> Result<MessageOutcome> {
        let worker = self
            .worker(target)
            .await
            .ok_or_else(|| ServiceWorkerError::NotFound(format!("no {target:?} worker")))?;

        let outcome = worker.handle_message(payload).await?;
        if outcome == MessageOutcome::SkipWaitingRequested && self.is_waiting(&worker).await {
            self.activate_waiting().await?;
        }
        Ok(outcome)
    }

    /// Retire every worker. `true` if there was anything to retire.
    pub async fn unregister(&self) -> bool {
        let slots = std::mem::take(&mut *self.slots.write().await);
        let mut any = false;
        for worker in [slots.installing, slots.waiting, slots.active].into_iter().flatten() {
            worker.mark_redundant().await;
            any = true;
        }
        if any {
            info!(scope = %self.scope, "Unregistered");
        }
        any
    }

    pub async fn worker(&self, slot: WorkerSlot) -> Option<Arc<ServiceWorker>> {
        let slots = self.slots.read().await;
        match slot {
            WorkerSlot::Installing => slots.installing.clone(),
            WorkerSlot::Waiting => slots.waiting.clone(),
            WorkerSlot::Active => slots.active.clone(),
        }
    }

    pub async fn active(&self) -> Option<Arc<ServiceWorker>> {
        self.worker(WorkerSlot::Active).await
    }

    pub async fn waiting(&self) -> Option<Arc<ServiceWorker>> {
        self.worker(WorkerSlot::Waiting).await
    }

    /// Register an open page. It is controlled immediately if a worker is active.
    pub async fn add_client(&self, mut client: Client) {
        if client.url.as_str().starts_with(self.scope.as_str()) {
            if let Some(active) = self.active().await {
                client.controller = Some(active.id());
            }
        }
        self.clients.write().await.add(client);
    }

    pub async fn remove_client(&self, id: &str) -> Option<Client> {
        self.clients.write().await.remove(id)
    }

    /// Controlling worker of a client.
    pub async fn controller_of(&self, client_id: &str) -> Option<WorkerId> {
        self.clients.read().await.get(client_id)?.controller
    }

    async fn is_waiting(&self, worker: &Arc<ServiceWorker>) -> bool {
        self.slots
            .read()
            .await
            .waiting
            .as_ref()
            .is_some_and(|w| Arc::ptr_eq(w, worker))
    }

    /// Make `worker` the active one and let it claim every client.
    async fn promote(&self, worker: Arc<ServiceWorker>) {
        let worker_id = worker.id();
        let previous = self.slots.write().await.active.replace(worker);
        if let Some(previous) = previous {
            previous.mark_redundant().await;
        }

        let claimed = self.clients.write().await.claim(worker_id, &self.scope);
        debug!(worker = %worker_id, clients = claimed.len(), "Claimed clients");
        for client_id in claimed {
            let _ = self.event_tx.send(ServiceWorkerEvent::ControllerChange {
                client_id,
                worker_id,
            });
        }
    }
}

impl std::fmt::Debug for ServiceWorkerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceWorkerRegistration")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
