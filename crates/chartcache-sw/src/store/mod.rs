//! Cache store contract.
//!
//! A [`CacheStorage`] is a factory of named [`Cache`] partitions. Every other
//! component talks to these two traits only, never to the storage technology
//! behind them.
//!
//! ```text
//! CacheStorage
//!     ├── "lesongs-v1"       (precache)
//!     │       └── CacheKey → Response
//!     └── "lesongs-runtime"  (runtime)
//!             └── CacheKey → Response
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chartcache_net::Response;
use thiserror::Error;

use crate::cache_key::CacheKey;

mod memory;

pub use memory::{MemoryCache, MemoryCacheStorage};

/// Failures of the backing store.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt entry {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// One named partition.
///
/// Implementations must be safe for concurrent use; writes to the same key
/// race and the last one wins.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Partition name.
    fn name(&self) -> &str;

    /// Look up an entry. `Ok(None)` on miss.
    async fn match_key(&self, key: &CacheKey) -> Result<Option<Response>, StoreError>;

    /// Store a response, replacing any entry at `key`.
    ///
    /// Takes ownership: a caller that also returns the response must
    /// [`Response::tee`] it first.
    async fn put(&self, key: &CacheKey, response: Response) -> Result<(), StoreError>;

    /// Remove an entry. `true` if something was removed.
    async fn delete(&self, key: &CacheKey) -> Result<bool, StoreError>;

    /// Every key currently stored.
    async fn keys(&self) -> Result<Vec<CacheKey>, StoreError>;
}

/// Factory of named partitions.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a partition, creating it if absent.
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StoreError>;

    /// Whether a partition exists.
    async fn has(&self, name: &str) -> Result<bool, StoreError>;

    /// Delete a partition and all its entries. `true` if it existed.
    async fn delete(&self, name: &str) -> Result<bool, StoreError>;

    /// Names of all partitions.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Version recorded by the last completed activation, if any.
    async fn active_version(&self) -> Result<Option<String>, StoreError>;

    /// Record `version` as activated. Written only once activation completes.
    async fn set_active_version(&self, version: &str) -> Result<(), StoreError>;
}
