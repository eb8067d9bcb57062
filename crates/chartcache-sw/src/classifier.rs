//! Request classification.
//!
//! Every request maps to exactly one [`RequestClass`], or to `None` when the
//! worker must not intercept it at all.

use http::Method;
use serde::{Deserialize, Serialize};
use url::{Origin, Url};

use crate::config::CacheConfig;

/// Policy class of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    /// Same-origin static content. Cache-first against the precache.
    Static,
    /// The songs-list query. Cache-then-network with expiration.
    RemoteListQuery,
    /// Any other backend REST read. Network-first.
    RemoteApiOther,
}

impl RequestClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestClass::Static => "static",
            RequestClass::RemoteListQuery => "remote_list_query",
            RequestClass::RemoteApiOther => "remote_api_other",
        }
    }
}

impl std::fmt::Display for RequestClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pure function of method + URL, parameterized by configuration.
#[derive(Debug, Clone)]
pub struct RequestClassifier {
    origin: Origin,
    rest_path_marker: String,
    list_path_marker: String,
    backend_host_marker: Option<String>,
}

impl RequestClassifier {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            origin: config.origin.origin(),
            rest_path_marker: config.rest_path_marker.clone(),
            list_path_marker: config.list_path_marker.clone(),
            backend_host_marker: config.backend_host_marker.clone(),
        }
    }

    /// Classify a raw request. `None` means skip: let the host handle it natively.
    pub fn classify(&self, method: &Method, url: &str) -> Option<RequestClass> {
        let url = Url::parse(url).ok()?;
        self.classify_url(method, &url)
    }

    /// Classify an already-parsed request URL.
    pub fn classify_url(&self, method: &Method, url: &Url) -> Option<RequestClass> {
        if *method != Method::GET {
            return None;
        }
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        if url.origin() != self.origin {
            return None;
        }

        if self.is_backend_host(url) && url.path().contains(&self.rest_path_marker) {
            if self.is_list_path(url.path()) {
                Some(RequestClass::RemoteListQuery)
            } else {
                Some(RequestClass::RemoteApiOther)
            }
        } else {
            Some(RequestClass::Static)
        }
    }

    /// Whether a request path targets the songs-list endpoint.
    pub fn is_list_path(&self, path: &str) -> bool {
        path.contains(&self.list_path_marker)
    }

    fn is_backend_host(&self, url: &Url) -> bool {
        match (&self.backend_host_marker, url.host_str()) {
            (None, _) => true,
            (Some(marker), Some(host)) => host.contains(marker.as_str()),
            (Some(_), None) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> RequestClassifier {
        let config = CacheConfig::for_app("lesongs", 1, Url::parse("https://app.example").unwrap());
        RequestClassifier::new(&config)
    }

    #[test]
    fn test_static_default() {
        let c = classifier();
        assert_eq!(
            c.classify(&Method::GET, "https://app.example/assets/index.js"),
            Some(RequestClass::Static)
        );
        assert_eq!(
            c.classify(&Method::GET, "https://app.example/"),
            Some(RequestClass::Static)
        );
    }

    #[test]
    fn test_list_query() {
        let c = classifier();
        assert_eq!(
            c.classify(&Method::GET, "https://app.example/rest/v1/LeSongs?select=*"),
            Some(RequestClass::RemoteListQuery)
        );
    }

    #[test]
    fn test_other_api() {
        let c = classifier();
        assert_eq!(
            c.classify(&Method::GET, "https://app.example/rest/v1/votes?device=eq.abc"),
            Some(RequestClass::RemoteApiOther)
        );
    }

    #[test]
    fn test_rest_marker_needs_backend_host() {
        let mut config =
            CacheConfig::for_app("lesongs", 1, Url::parse("https://api.supabase.co").unwrap());
        config.backend_host_marker = Some("supabase.co".to_string());
        let c = RequestClassifier::new(&config);
        assert_eq!(
            c.classify(&Method::GET, "https://api.supabase.co/rest/v1/LeSongs"),
            Some(RequestClass::RemoteListQuery)
        );

        config.backend_host_marker = Some("backend.internal".to_string());
        let c = RequestClassifier::new(&config);
        assert_eq!(
            c.classify(&Method::GET, "https://api.supabase.co/rest/v1/LeSongs"),
            Some(RequestClass::Static)
        );
    }

    #[test]
    fn test_skip_non_get() {
        let c = classifier();
        for method in [Method::POST, Method::PUT, Method::DELETE, Method::PATCH, Method::HEAD] {
            assert_eq!(c.classify(&method, "https://app.example/rest/v1/LeSongs"), None);
        }
    }

    #[test]
    fn test_skip_non_http_scheme() {
        let c = classifier();
        assert_eq!(c.classify(&Method::GET, "chrome-extension://abcdef/inject.js"), None);
        assert_eq!(c.classify(&Method::GET, "data:text/plain,hello"), None);
        assert_eq!(c.classify(&Method::GET, "ftp://app.example/file"), None);
    }

    #[test]
    fn test_skip_cross_origin() {
        let c = classifier();
        assert_eq!(c.classify(&Method::GET, "https://cdn.example/lib.js"), None);
        assert_eq!(c.classify(&Method::GET, "http://app.example/"), None);
        assert_eq!(c.classify(&Method::GET, "https://app.example:8443/"), None);
    }

    #[test]
    fn test_skip_malformed() {
        let c = classifier();
        assert_eq!(c.classify(&Method::GET, "not a url"), None);
        assert_eq!(c.classify(&Method::GET, "https://"), None);
        assert_eq!(c.classify(&Method::GET, ""), None);
    }

    #[test]
    fn test_is_list_path() {
        let c = classifier();
        assert!(c.is_list_path("/rest/v1/LeSongs"));
        assert!(!c.is_list_path("/rest/v1/votes"));
    }
}
