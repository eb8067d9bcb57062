//! # chartcache service worker
//!
//! Offline and runtime HTTP cache for the LeSongs voting chart.
//!
//! ## Features
//!
//! - **Classification**: every page request maps to a policy class or is skipped
//! - **Strategies**: cache-first, network-first, cache-then-network with expiration
//! - **Lifecycle**: install (precache), activate (sweep), skip-waiting, claim
//! - **Control channel**: `SKIP_WAITING` and `CLEAR_SONGS_CACHE` from pages
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerRegistration
//!     ├── installing (ServiceWorker)
//!     ├── waiting (ServiceWorker)
//!     ├── active (ServiceWorker)
//!     │       └── StrategyEngine
//!     │               ├── RequestClassifier
//!     │               ├── CacheStorage ── Cache ── CacheKey → Response
//!     │               └── Fetcher
//!     └── Clients
//! ```

use thiserror::Error;

pub mod cache_key;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod control;
pub mod event;
pub mod lifecycle;
pub mod registration;
pub mod store;
pub mod strategy;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache_key::CacheKey;
pub use classifier::{RequestClass, RequestClassifier};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use control::{ControlMessage, MessageOutcome};
pub use event::{FetchEvent, FetchOutcome, ServiceWorkerEvent, WorkerId};
pub use lifecycle::WorkerState;
pub use registration::{Client, Clients, ServiceWorkerRegistration, WorkerSlot};
pub use store::{Cache, CacheStorage, MemoryCache, MemoryCacheStorage, StoreError};
pub use strategy::{StrategyEngine, CACHE_DATE_HEADER};
pub use worker::{HostBindings, ServiceWorker};

/// Errors that can occur in service worker operations.
#[derive(Error, Debug)]
pub enum ServiceWorkerError {
    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Cache error: {0}")]
    Cache(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, ServiceWorkerError>;
