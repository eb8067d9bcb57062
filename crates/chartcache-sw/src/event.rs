//! Events exchanged with the host.

use std::sync::atomic::{AtomicU64, Ordering};

use chartcache_net::{Request, Response};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

use crate::lifecycle::WorkerState;

/// Unique identifier for a worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sw-{}", self.0)
    }
}

/// An outgoing request from a controlled page.
///
/// The URL is kept as the raw string the page used; it may not parse.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    /// Request URL, unparsed.
    pub url: String,

    /// Request method.
    pub method: Method,

    /// Request headers.
    pub headers: HeaderMap,

    /// Issuing client, if known.
    pub client_id: Option<String>,
}

impl FetchEvent {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: HeaderMap::new(),
            client_id: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Tag with the issuing client.
    pub fn from_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Build the network request this event describes.
    pub fn to_request(&self) -> Result<Request, url::ParseError> {
        let url = Url::parse(&self.url)?;
        let mut request = Request::new(self.method.clone(), url);
        request.headers = self.headers.clone();
        Ok(request)
    }
}

/// What the worker did with a fetch event.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The worker answered.
    Respond(Response),
    /// Not intercepted; the host performs the request itself.
    Passthrough,
}

impl FetchOutcome {
    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::Respond(response) => Some(response),
            FetchOutcome::Passthrough => None,
        }
    }
}

/// Notifications emitted to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceWorkerEvent {
    /// A worker changed lifecycle state.
    StateChange {
        worker_id: WorkerId,
        version: String,
        new_state: WorkerState,
    },
    /// A client is now controlled by a different worker.
    ControllerChange { client_id: String, worker_id: WorkerId },
    /// Entries were purged from a partition on request of a page.
    CachePurged { partition: String, removed: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_request_copies_headers() {
        let event = FetchEvent::get("https://app.example/rest/v1/LeSongs?select=*")
            .header(http::header::ACCEPT, HeaderValue::from_static("application/json"))
            .from_client("client-1");
        let request = event.to_request().unwrap();

        assert_eq!(request.method, Method::GET);
        assert_eq!(request.url.query(), Some("select=*"));
        assert_eq!(request.headers.get("accept").unwrap(), "application/json");
        assert_eq!(event.client_id.as_deref(), Some("client-1"));
    }

    #[test]
    fn test_to_request_rejects_malformed_url() {
        assert!(FetchEvent::get("::nope::").to_request().is_err());
    }

    #[test]
    fn test_worker_ids_are_unique() {
        assert_ne!(WorkerId::new(), WorkerId::new());
    }
}
