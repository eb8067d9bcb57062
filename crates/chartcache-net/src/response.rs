//! Buffered HTTP response snapshots.

use bytes::Bytes;
use http::{header::CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, StatusCode};
use url::Url;

/// HTTP response with a fully buffered body.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Final URL, when the response came from the network.
    pub url: Option<Url>,
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    /// Create a response with the canonical reason phrase for `status`.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            url: None,
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body: body.into(),
        }
    }

    /// Create a synthesized `text/plain` response.
    pub fn plain_text(status: StatusCode, body: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self::new(status, headers, body.into())
    }

    /// Check if request was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Get a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Replace a header, builder style.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.body.to_vec())
    }

    /// Split into two independent copies, one for the caller and one for a store.
    pub fn tee(self) -> (Response, Response) {
        let copy = Response {
            url: self.url.clone(),
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        };
        (self, copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_response() {
        let response = Response::plain_text(StatusCode::GATEWAY_TIMEOUT, "offline");
        assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(response.status_text, "Gateway Timeout");
        assert_eq!(response.header("content-type"), Some("text/plain; charset=utf-8"));
        assert_eq!(response.text().unwrap(), "offline");
        assert!(!response.ok());
    }

    #[test]
    fn test_tee_copies_are_independent() {
        let original = Response::new(StatusCode::OK, HeaderMap::new(), "[1,2]");
        let (returned, stored) = original.tee();
        let stored = stored.with_header(
            HeaderName::from_static("x-extra"),
            HeaderValue::from_static("1"),
        );

        assert_eq!(returned.body, stored.body);
        assert!(returned.header("x-extra").is_none());
        assert_eq!(stored.header("x-extra"), Some("1"));
    }
}
