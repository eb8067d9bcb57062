//! In-process store. Contents live as long as the storage value.

use std::sync::Arc;

use async_trait::async_trait;
use chartcache_net::Response;
use hashbrown::HashMap;
use tokio::sync::RwLock;

use super::{Cache, CacheStorage, StoreError};
use crate::cache_key::CacheKey;

/// A partition held in memory.
#[derive(Debug)]
pub struct MemoryCache {
    name: String,
    entries: RwLock<HashMap<String, (CacheKey, Response)>>,
}

impl MemoryCache {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_key(&self, key: &CacheKey) -> Result<Option<Response>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .get(key.as_str())
            .map(|(_, response)| response.clone()))
    }

    async fn put(&self, key: &CacheKey, response: Response) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.as_str().to_string(), (key.clone(), response));
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, StoreError> {
        Ok(self.entries.write().await.remove(key.as_str()).is_some())
    }

    async fn keys(&self) -> Result<Vec<CacheKey>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .map(|(key, _)| key.clone())
            .collect())
    }
}

/// In-memory [`CacheStorage`].
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<HashMap<String, Arc<MemoryCache>>>,
    active: RwLock<Option<String>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StoreError> {
        let mut caches = self.caches.write().await;
        let cache = caches
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCache::new(name)));
        Ok(Arc::clone(cache) as Arc<dyn Cache>)
    }

    async fn has(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.caches.read().await.contains_key(name))
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.caches.write().await.remove(name).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn active_version(&self) -> Result<Option<String>, StoreError> {
        Ok(self.active.read().await.clone())
    }

    async fn set_active_version(&self, version: &str) -> Result<(), StoreError> {
        *self.active.write().await = Some(version.to_string());
        Ok(())
    }
}
