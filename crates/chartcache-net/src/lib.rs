//! # chartcache net
//!
//! Request/response model and network access for the chartcache service worker.
//!
//! ## Design Goals
//!
//! 1. **Owned snapshots**: a [`Response`] body is fully buffered, so handing the
//!    same response to a caller and to a cache store is an explicit [`Response::tee`]
//! 2. **One network seam**: everything that touches the network goes through
//!    the [`Fetcher`] trait, so cache policy can be tested without sockets
//! 3. **Async HTTP**: [`ResourceLoader`] implements [`Fetcher`] on top of reqwest

use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use thiserror::Error;
use url::Url;

pub mod loader;
pub mod response;

pub use loader::{LoaderConfig, ResourceLoader};
pub use response::Response;

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl From<chartcache_common::ChartCacheError> for NetError {
    fn from(err: chartcache_common::ChartCacheError) -> Self {
        match err {
            chartcache_common::ChartCacheError::Timeout(after) => NetError::Timeout(after),
            other => NetError::RequestFailed(other.to_string()),
        }
    }
}

/// A bodiless request, as the cache layer sees it.
///
/// The cache only ever stores what GET returns, so requests carry no body.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
}

impl Request {
    /// Create a request with the given method.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            url,
            method,
            headers: HeaderMap::new(),
        }
    }

    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Add a header. Repeated names are appended, not replaced.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }
}

/// The network, as seen by the cache layer.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request. Non-2xx statuses are responses, not errors.
    async fn fetch(&self, request: Request) -> Result<Response, NetError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let url = Url::parse("https://example.com").unwrap();
        let request = Request::get(url.clone()).header(
            HeaderName::from_static("accept"),
            HeaderValue::from_static("application/json"),
        );

        assert_eq!(request.url, url);
        assert_eq!(request.method, Method::GET);
        assert!(request.headers.contains_key("accept"));
    }

    #[test]
    fn test_repeated_headers_append() {
        let url = Url::parse("https://example.com").unwrap();
        let request = Request::get(url)
            .header(HeaderName::from_static("accept"), HeaderValue::from_static("a"))
            .header(HeaderName::from_static("accept"), HeaderValue::from_static("b"));

        assert_eq!(request.headers.get_all("accept").iter().count(), 2);
    }

    #[test]
    fn test_timeout_error_converts() {
        let err: NetError =
            chartcache_common::ChartCacheError::Timeout(Duration::from_secs(3)).into();
        assert!(matches!(err, NetError::Timeout(d) if d == Duration::from_secs(3)));
    }

    #[test]
    fn test_other_common_errors_become_request_failures() {
        let err: NetError = chartcache_common::ChartCacheError::NotFound("index.html".into()).into();
        assert!(matches!(err, NetError::RequestFailed(msg) if msg.contains("index.html")));
    }
}
