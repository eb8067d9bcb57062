//! reqwest-backed [`Fetcher`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, trace};

use crate::{Fetcher, NetError, Request, Response};

/// Resource loader configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string.
    pub user_agent: String,
    /// Client-wide timeout. `None` leaves slow networks to the network.
    pub default_timeout: Option<Duration>,
    /// Maximum redirects.
    pub max_redirects: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("chartcache/{}", env!("CARGO_PKG_VERSION")),
            default_timeout: None,
            max_redirects: 10,
        }
    }
}

/// Resource loader for fetching URLs.
pub struct ResourceLoader {
    client: Client,
}

impl ResourceLoader {
    /// Create a new resource loader.
    pub fn new(config: LoaderConfig) -> Result<Self, NetError> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects));
        if let Some(timeout) = config.default_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        info!("ResourceLoader initialized");

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for ResourceLoader {
    async fn fetch(&self, request: Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, "Fetching resource");

        let response = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;

        trace!(
            url = %url,
            status = %status,
            body_len = body.len(),
            "Response received"
        );

        let mut response = Response::new(status, headers, body);
        response.url = Some(url);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_loader_config_default() {
        let config = LoaderConfig::default();
        assert!(config.user_agent.starts_with("chartcache/"));
        assert!(config.default_timeout.is_none());
    }

    #[tokio::test]
    async fn test_fetch_returns_buffered_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/LeSongs"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"id":1}]"#))
            .mount(&server)
            .await;

        let loader = ResourceLoader::new(LoaderConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/rest/v1/LeSongs", server.uri())).unwrap();
        let request = Request::get(url).header(
            http::header::ACCEPT,
            http::HeaderValue::from_static("application/json"),
        );

        let response = loader.fetch(request).await.unwrap();
        assert!(response.ok());
        assert_eq!(response.text().unwrap(), r#"[{"id":1}]"#);
        assert!(response.url.is_some());
    }

    #[tokio::test]
    async fn test_fetch_non_ok_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let loader = ResourceLoader::new(LoaderConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/missing.png", server.uri())).unwrap();

        let response = loader.fetch(Request::get(url)).await.unwrap();
        assert_eq!(response.status, http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_error() {
        let loader = ResourceLoader::new(LoaderConfig::default()).unwrap();
        let url = Url::parse("http://127.0.0.1:1/").unwrap();

        assert!(loader.fetch(Request::get(url)).await.is_err());
    }
}
