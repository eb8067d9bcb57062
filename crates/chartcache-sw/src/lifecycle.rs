//! Install and activate steps.
//!
//! Install fetches the whole manifest before writing anything. A write that
//! fails midway is rolled back: a partition the install created is dropped,
//! an existing one loses the entries written so far. Activate deletes every
//! partition that is not on the current allow-list.

use chartcache_common::with_timeout;
use chartcache_net::{Fetcher, NetError, Request, Response};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache_key::CacheKey;
use crate::config::CacheConfig;
use crate::store::{Cache, CacheStorage};
use crate::{Result, ServiceWorkerError};

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Created, not yet installing.
    #[default]
    Parsed,
    /// Precaching the manifest.
    Installing,
    /// Installed, waiting for activation.
    Installed,
    /// Sweeping old partitions.
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Replaced, or install failed.
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        }
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: WorkerState) -> bool {
        use WorkerState::*;
        match (self, next) {
            (Redundant, _) => false,
            (_, Redundant) => true,
            (Parsed, Installing)
            | (Installing, Installed)
            | (Installed, Activating)
            | (Activating, Activated) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fetch every manifest entry and store it in the precache partition.
///
/// Returns the number of entries stored.
pub async fn precache(
    config: &CacheConfig,
    storage: &dyn CacheStorage,
    fetcher: &dyn Fetcher,
) -> Result<usize> {
    let requests: Vec<Request> = config
        .manifest_urls()?
        .into_iter()
        .map(Request::get)
        .collect();

    let fetched = join_all(requests.iter().map(|request| async move {
        let result = fetch_with_guard(config, fetcher, request.clone()).await;
        (request, result)
    }))
    .await;

    let mut entries = Vec::with_capacity(fetched.len());
    for (request, result) in fetched {
        match result {
            Ok(response) if response.ok() => {
                entries.push((CacheKey::for_request(request), response));
            }
            Ok(response) => {
                return Err(ServiceWorkerError::InstallFailed(format!(
                    "{} returned {}",
                    request.url, response.status
                )));
            }
            Err(e) => {
                return Err(ServiceWorkerError::InstallFailed(format!(
                    "{}: {e}",
                    request.url
                )));
            }
        }
    }

    let existed = storage.has(&config.precache_name).await?;
    let cache = storage.open(&config.precache_name).await?;
    let mut written: Vec<CacheKey> = Vec::with_capacity(entries.len());
    for (key, response) in entries {
        if let Err(e) = cache.put(&key, response).await {
            warn!(partition = %config.precache_name, error = %e, "Precache write failed, rolling back");
            rollback(config, storage, cache.as_ref(), existed, &written).await;
            return Err(e.into());
        }
        debug!(key = %key, "Precached");
        written.push(key);
    }

    info!(
        partition = %config.precache_name,
        entries = written.len(),
        "Precache complete"
    );
    Ok(written.len())
}

/// Delete every partition outside the allow-list. Returns the deleted names.
///
/// A partition that fails to delete is logged and left for the next activation.
pub async fn sweep(config: &CacheConfig, storage: &dyn CacheStorage) -> Result<Vec<String>> {
    let mut deleted = Vec::new();
    for name in storage.keys().await? {
        if config.is_allowed(&name) {
            continue;
        }
        match storage.delete(&name).await {
            Ok(true) => {
                info!(partition = %name, "Deleted stale partition");
                deleted.push(name);
            }
            Ok(false) => {}
            Err(e) => warn!(partition = %name, error = %e, "Failed to delete stale partition"),
        }
    }
    Ok(deleted)
}

async fn rollback(
    config: &CacheConfig,
    storage: &dyn CacheStorage,
    cache: &dyn Cache,
    existed: bool,
    written: &[CacheKey],
) {
    if !existed {
        if let Err(e) = storage.delete(&config.precache_name).await {
            warn!(partition = %config.precache_name, error = %e, "Failed to drop partial precache");
        }
        return;
    }
    for key in written {
        if let Err(e) = cache.delete(key).await {
            warn!(key = %key, error = %e, "Failed to roll back precache entry");
        }
    }
}

async fn fetch_with_guard(
    config: &CacheConfig,
    fetcher: &dyn Fetcher,
    request: Request,
) -> std::result::Result<Response, NetError> {
    match config.network_timeout() {
        Some(limit) => with_timeout(limit, || fetcher.fetch(request)).await?,
        None => fetcher.fetch(request).await,
    }
}
