//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chartcache_net::{Fetcher, NetError, Request, Response};
use chrono::{DateTime, Utc};
use http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, StatusCode};
use url::Url;

use crate::cache_key::CacheKey;
use crate::config::CacheConfig;
use crate::store::{Cache, CacheStorage, MemoryCacheStorage, StoreError};

pub fn fixed_now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn test_config() -> CacheConfig {
    CacheConfig::for_app("lesongs", 1, Url::parse("https://app.example/").unwrap())
}

pub fn json(body: &'static str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Response::new(StatusCode::OK, headers, body)
}

#[derive(Clone)]
enum Route {
    Respond(StatusCode, String),
    Fail,
    Hang,
}

/// Scripted network. Unscripted URLs fail as if offline.
#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, Route>>,
    calls: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: StatusCode, body: &str) {
        self.route(url, Route::Respond(status, body.to_string()));
    }

    pub fn fail(&self, url: &str) {
        self.route(url, Route::Fail);
    }

    pub fn hang(&self, url: &str) {
        self.route(url, Route::Hang);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn route(&self, url: &str, route: Route) {
        self.routes.lock().unwrap().insert(url.to_string(), route);
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: Request) -> Result<Response, NetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let url = request.url.to_string();
        let route = self.routes.lock().unwrap().get(&url).cloned();

        match route {
            Some(Route::Respond(status, body)) => {
                let mut response = Response::new(status, HeaderMap::new(), body);
                response.url = Some(request.url);
                Ok(response)
            }
            Some(Route::Hang) => futures::future::pending().await,
            Some(Route::Fail) | None => Err(NetError::RequestFailed(format!("offline: {url}"))),
        }
    }
}

/// A partition whose every operation fails.
pub struct FailingCache {
    name: String,
    puts: AtomicUsize,
}

impl FailingCache {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            puts: AtomicUsize::new(0),
        }
    }

    pub fn put_attempts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Cache for FailingCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_key(&self, _key: &CacheKey) -> Result<Option<Response>, StoreError> {
        Err(StoreError::Backend("read failed".to_string()))
    }

    async fn put(&self, _key: &CacheKey, _response: Response) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Backend("quota exceeded".to_string()))
    }

    async fn delete(&self, _key: &CacheKey) -> Result<bool, StoreError> {
        Err(StoreError::Backend("delete failed".to_string()))
    }

    async fn keys(&self) -> Result<Vec<CacheKey>, StoreError> {
        Err(StoreError::Backend("keys failed".to_string()))
    }
}

/// Storage that hands out the same failing partition under every name.
struct FailingStorage {
    cache: Arc<FailingCache>,
}

#[async_trait]
impl CacheStorage for FailingStorage {
    async fn open(&self, _name: &str) -> Result<Arc<dyn Cache>, StoreError> {
        Ok(self.cache.clone() as Arc<dyn Cache>)
    }

    async fn has(&self, _name: &str) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn delete(&self, _name: &str) -> Result<bool, StoreError> {
        Err(StoreError::Backend("delete failed".to_string()))
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Unavailable("keys failed".to_string()))
    }

    async fn active_version(&self) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("marker read failed".to_string()))
    }

    async fn set_active_version(&self, _version: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("marker write failed".to_string()))
    }
}

pub fn failing_storage(cache: Arc<FailingCache>) -> Arc<dyn CacheStorage> {
    Arc::new(FailingStorage { cache })
}

/// Memory storage whose writes can be slowed down or cut off after a budget.
pub struct ScriptedStorage {
    inner: MemoryCacheStorage,
    script: Arc<PutScript>,
}

struct PutScript {
    budget: AtomicUsize,
    delay: Duration,
}

impl ScriptedStorage {
    /// Allow `puts` successful writes, then fail every further one.
    pub fn failing_after(puts: usize) -> Self {
        Self::scripted(puts, Duration::ZERO)
    }

    /// Every write takes `delay` before it lands.
    pub fn slow(delay: Duration) -> Self {
        Self::scripted(usize::MAX, delay)
    }

    fn scripted(puts: usize, delay: Duration) -> Self {
        Self {
            inner: MemoryCacheStorage::new(),
            script: Arc::new(PutScript {
                budget: AtomicUsize::new(puts),
                delay,
            }),
        }
    }
}

struct ScriptedCache {
    inner: Arc<dyn Cache>,
    script: Arc<PutScript>,
}

#[async_trait]
impl Cache for ScriptedCache {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn match_key(&self, key: &CacheKey) -> Result<Option<Response>, StoreError> {
        self.inner.match_key(key).await
    }

    async fn put(&self, key: &CacheKey, response: Response) -> Result<(), StoreError> {
        if !self.script.delay.is_zero() {
            tokio::time::sleep(self.script.delay).await;
        }
        let spent = self
            .script
            .budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if spent.is_err() {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        self.inner.put(key, response).await
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }

    async fn keys(&self) -> Result<Vec<CacheKey>, StoreError> {
        self.inner.keys().await
    }
}

#[async_trait]
impl CacheStorage for ScriptedStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StoreError> {
        let inner = self.inner.open(name).await?;
        Ok(Arc::new(ScriptedCache {
            inner,
            script: Arc::clone(&self.script),
        }))
    }

    async fn has(&self, name: &str) -> Result<bool, StoreError> {
        self.inner.has(name).await
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        self.inner.delete(name).await
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.inner.keys().await
    }

    async fn active_version(&self) -> Result<Option<String>, StoreError> {
        self.inner.active_version().await
    }

    async fn set_active_version(&self, version: &str) -> Result<(), StoreError> {
        self.inner.set_active_version(version).await
    }
}
