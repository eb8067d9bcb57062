//! Cache policy configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::ServiceWorkerError;

/// Application name used to derive partition names.
pub const DEFAULT_APP_NAME: &str = "lesongs";

/// Page origin of the default configuration.
pub const DEFAULT_ORIGIN: &str = "http://localhost/";

/// Precache version baked into the default configuration.
pub const DEFAULT_VERSION: u32 = 1;

/// Freshness window of the list query: 120 minutes.
pub const DEFAULT_EXPIRATION_WINDOW_MS: u64 = 120 * 60 * 1000;

/// Path marker of the backend REST namespace.
pub const REST_PATH_MARKER: &str = "/rest/v1/";

/// Path marker of the songs-list endpoint.
pub const LIST_PATH_MARKER: &str = "/rest/v1/LeSongs";

/// Static assets precached on install.
pub const DEFAULT_MANIFEST: [&str; 4] = ["/", "/index.html", "/favicon.svg", "/default-cover.png"];

/// Cache policy, built once at worker startup and shared by every component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Origin of the controlled pages. Requests from any other origin are skipped.
    pub origin: Url,

    /// Version-pinned partition for static assets (`<app>-v<N>`).
    pub precache_name: String,

    /// Partition for runtime entries (`<app>-runtime`).
    pub runtime_name: String,

    /// Freshness window of the expiring strategy, in milliseconds.
    pub expiration_window_ms: u64,

    /// Path marker of the backend REST namespace.
    pub rest_path_marker: String,

    /// Path marker of the songs-list endpoint.
    pub list_path_marker: String,

    /// Substring the backend host must contain. `None` accepts any host.
    pub backend_host_marker: Option<String>,

    /// Root-level paths fetched and stored on install.
    pub manifest: Vec<String>,

    /// Optional guard on network fetches. Unset means no timeout.
    pub network_timeout_ms: Option<u64>,

    /// Attempts per store write before giving up.
    pub store_write_attempts: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        // Constant input: `Url` has no infallible constructor, and this parse cannot fail.
        let origin = Url::parse(DEFAULT_ORIGIN).expect("DEFAULT_ORIGIN is a valid URL");
        Self::for_app(DEFAULT_APP_NAME, DEFAULT_VERSION, origin)
    }
}

impl CacheConfig {
    /// Build the default policy for an app name, precache version and page origin.
    pub fn for_app(app: &str, version: u32, origin: Url) -> Self {
        Self {
            origin,
            precache_name: format!("{app}-v{version}"),
            runtime_name: format!("{app}-runtime"),
            expiration_window_ms: DEFAULT_EXPIRATION_WINDOW_MS,
            rest_path_marker: REST_PATH_MARKER.to_string(),
            list_path_marker: LIST_PATH_MARKER.to_string(),
            backend_host_marker: None,
            manifest: DEFAULT_MANIFEST.iter().map(|p| p.to_string()).collect(),
            network_timeout_ms: None,
            store_write_attempts: 2,
        }
    }

    /// Expiration window as a duration.
    pub fn expiration_window(&self) -> Duration {
        Duration::from_millis(self.expiration_window_ms)
    }

    /// Network timeout guard, if configured.
    pub fn network_timeout(&self) -> Option<Duration> {
        self.network_timeout_ms.map(Duration::from_millis)
    }

    /// Partition names that survive activation.
    pub fn allow_list(&self) -> [&str; 2] {
        [&self.precache_name, &self.runtime_name]
    }

    /// Whether a partition belongs to the current version.
    pub fn is_allowed(&self, partition: &str) -> bool {
        self.allow_list().contains(&partition)
    }

    /// Manifest paths resolved against the origin.
    pub fn manifest_urls(&self) -> Result<Vec<Url>, ServiceWorkerError> {
        self.manifest
            .iter()
            .map(|path| {
                self.origin
                    .join(path)
                    .map_err(|e| ServiceWorkerError::Config(format!("manifest entry `{path}`: {e}")))
            })
            .collect()
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ServiceWorkerError> {
        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(ServiceWorkerError::Config(format!(
                "origin must be http or https, got `{}`",
                self.origin.scheme()
            )));
        }
        if self.precache_name.is_empty() || self.runtime_name.is_empty() {
            return Err(ServiceWorkerError::Config(
                "partition names must not be empty".to_string(),
            ));
        }
        if self.precache_name == self.runtime_name {
            return Err(ServiceWorkerError::Config(format!(
                "precache and runtime partitions share the name `{}`",
                self.precache_name
            )));
        }
        if self.expiration_window_ms == 0 {
            return Err(ServiceWorkerError::Config(
                "expiration window must be positive".to_string(),
            ));
        }
        if self.rest_path_marker.is_empty() || self.list_path_marker.is_empty() {
            return Err(ServiceWorkerError::Config(
                "path markers must not be empty".to_string(),
            ));
        }
        for url in self.manifest_urls()? {
            if url.origin() != self.origin.origin() {
                return Err(ServiceWorkerError::Config(format!(
                    "manifest entry `{url}` is not on the origin"
                )));
            }
        }
        Ok(())
    }
}
