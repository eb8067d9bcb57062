//! Fetch-resolution strategies.
//!
//! | class               | strategy                      | partition |
//! |---------------------|-------------------------------|-----------|
//! | `Static`            | cache-first                   | precache  |
//! | `RemoteApiOther`    | network-first                 | runtime   |
//! | `RemoteListQuery`   | cache-then-network, expiring  | runtime   |
//!
//! No strategy lets a network failure escape: it becomes a cached fallback or
//! a synthesized 408/504 `text/plain` response.

use std::sync::Arc;

use chartcache_common::{retry_with_backoff, with_timeout, RetryConfig};
use chartcache_net::{Fetcher, NetError, Request, Response};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use http::{HeaderName, HeaderValue, StatusCode};
use tracing::{debug, warn};

use crate::cache_key::CacheKey;
use crate::classifier::{RequestClass, RequestClassifier};
use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::event::{FetchEvent, FetchOutcome};
use crate::store::{Cache, CacheStorage};

/// Header carrying the time an expiring entry was stored.
pub const CACHE_DATE_HEADER: &str = "sw-cache-date";

const STATIC_OFFLINE_BODY: &str = "Network error: this resource is not available offline.";
const API_OFFLINE_BODY: &str = "Network error: no cached data available.";

/// Executes the strategy assigned to each request class.
pub struct StrategyEngine {
    config: Arc<CacheConfig>,
    classifier: RequestClassifier,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    write_retry: RetryConfig,
}

impl StrategyEngine {
    pub fn new(
        config: Arc<CacheConfig>,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            classifier: RequestClassifier::new(&config),
            write_retry: RetryConfig::store_writes(config.store_write_attempts),
            config,
            storage,
            fetcher,
            clock,
        }
    }

    pub fn classifier(&self) -> &RequestClassifier {
        &self.classifier
    }

    /// Classify a fetch event and run its strategy.
    pub async fn handle_fetch(&self, event: &FetchEvent) -> FetchOutcome {
        let Some(class) = self.classifier.classify(&event.method, &event.url) else {
            debug!(url = %event.url, method = %event.method, "Not intercepted");
            return FetchOutcome::Passthrough;
        };
        let Ok(request) = event.to_request() else {
            return FetchOutcome::Passthrough;
        };

        debug!(url = %request.url, class = %class, "Intercepted");
        let response = match class {
            RequestClass::Static => self.cache_first(request, &self.config.precache_name).await,
            RequestClass::RemoteApiOther => {
                self.network_first(request, &self.config.runtime_name).await
            }
            RequestClass::RemoteListQuery => {
                self.cache_then_network(request, &self.config.runtime_name)
                    .await
            }
        };
        FetchOutcome::Respond(response)
    }

    /// Cache-first with network fallback. Hits are never revalidated.
    pub async fn cache_first(&self, request: Request, partition: &str) -> Response {
        let key = CacheKey::for_request(&request);
        let cache = self.open_partition(partition).await;

        if let Some(cached) = self.lookup(cache.as_ref(), &key).await {
            debug!(key = %key, "Cache-first hit");
            return cached;
        }

        match self.fetch_network(request).await {
            Ok(response) if response.ok() => {
                let (returned, stored) = response.tee();
                self.persist(cache.as_ref(), key, stored).await;
                returned
            }
            Ok(response) => {
                debug!(key = %key, status = %response.status, "Not caching non-ok response");
                response
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Static fetch failed with nothing cached");
                Response::plain_text(StatusCode::REQUEST_TIMEOUT, STATIC_OFFLINE_BODY)
            }
        }
    }

    /// Network-first with cache fallback. Fallback entries are served however old.
    pub async fn network_first(&self, request: Request, partition: &str) -> Response {
        let key = CacheKey::for_request(&request);
        let cache = self.open_partition(partition).await;

        match self.fetch_network(request).await {
            Ok(response) if response.ok() => {
                let (returned, stored) = response.tee();
                self.persist(cache.as_ref(), key, stored).await;
                returned
            }
            Ok(response) => response,
            Err(e) => match self.lookup(cache.as_ref(), &key).await {
                Some(cached) => {
                    debug!(key = %key, error = %e, "Network failed, serving cached entry");
                    cached
                }
                None => {
                    warn!(key = %key, error = %e, "Network failed with nothing cached");
                    Response::plain_text(StatusCode::GATEWAY_TIMEOUT, API_OFFLINE_BODY)
                }
            },
        }
    }

    /// Cache-then-network with time-based expiration.
    ///
    /// A fresh hit is returned without touching the network. On refresh the
    /// stamped copy is stored and the unstamped network response returned.
    pub async fn cache_then_network(&self, request: Request, partition: &str) -> Response {
        let key = CacheKey::for_request(&request);
        let cache = self.open_partition(partition).await;
        let now = self.clock.now();

        let cached = self.lookup(cache.as_ref(), &key).await;
        if let Some(ref entry) = cached {
            if self.is_fresh(entry, now) {
                debug!(key = %key, "Fresh cache hit");
                return entry.clone();
            }
            debug!(key = %key, "Cached entry expired");
        }

        match self.fetch_network(request).await {
            Ok(response) if response.ok() => {
                let (returned, stored) = response.tee();
                self.persist(cache.as_ref(), key, stamp(stored, now)).await;
                returned
            }
            Ok(response) => response,
            Err(e) => match cached {
                Some(stale) => {
                    debug!(key = %key, error = %e, "Network failed, serving stale entry");
                    stale
                }
                None => {
                    warn!(key = %key, error = %e, "Network failed with nothing cached");
                    Response::plain_text(StatusCode::GATEWAY_TIMEOUT, API_OFFLINE_BODY)
                }
            },
        }
    }

    /// Entries without a readable stamp are stale. Stamps in the future are fresh.
    fn is_fresh(&self, entry: &Response, now: DateTime<Utc>) -> bool {
        let Some(stored_at) = entry.header(CACHE_DATE_HEADER).and_then(parse_cache_date) else {
            return false;
        };
        let window = i64::try_from(self.config.expiration_window_ms)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .unwrap_or(TimeDelta::MAX);
        now - stored_at < window
    }

    async fn fetch_network(&self, request: Request) -> Result<Response, NetError> {
        match self.config.network_timeout() {
            Some(limit) => with_timeout(limit, || self.fetcher.fetch(request)).await?,
            None => self.fetcher.fetch(request).await,
        }
    }

    async fn open_partition(&self, name: &str) -> Option<Arc<dyn Cache>> {
        match self.storage.open(name).await {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!(partition = name, error = %e, "Cannot open partition, bypassing cache");
                None
            }
        }
    }

    /// Read errors count as misses.
    async fn lookup(&self, cache: Option<&Arc<dyn Cache>>, key: &CacheKey) -> Option<Response> {
        let cache = cache?;
        match cache.match_key(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(partition = cache.name(), key = %key, error = %e, "Cache read failed");
                None
            }
        }
    }

    /// Store a copy and wait for it. The write runs as its own task, so it
    /// completes even if the caller stops waiting.
    async fn persist(&self, cache: Option<&Arc<dyn Cache>>, key: CacheKey, response: Response) {
        let Some(cache) = cache else {
            return;
        };
        let cache = Arc::clone(cache);
        let retry = self.write_retry.clone();

        let write = tokio::spawn(async move {
            let result = {
                let (cache, key, response) = (&cache, &key, &response);
                retry_with_backoff(&retry, move || cache.put(key, response.clone())).await
            };
            if let Err(e) = result {
                warn!(partition = cache.name(), key = %key, error = %e, "Cache write failed");
            }
        });

        if let Err(e) = write.await {
            warn!(error = %e, "Cache write task aborted");
        }
    }
}

/// Copy of `response` carrying a `sw-cache-date` stamp.
fn stamp(response: Response, now: DateTime<Utc>) -> Response {
    match HeaderValue::from_str(&now.to_rfc3339_opts(SecondsFormat::Millis, true)) {
        Ok(value) => response.with_header(HeaderName::from_static(CACHE_DATE_HEADER), value),
        Err(_) => response,
    }
}

/// Accepts RFC 3339, RFC 2822 and epoch milliseconds.
pub fn parse_cache_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .map(|date| date.with_timezone(&Utc))
        .ok()
        .or_else(|| value.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis))
}
