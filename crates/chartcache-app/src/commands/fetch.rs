//! `chartcache fetch` command implementation.

use anyhow::{anyhow, bail};
use chartcache_common::OptionExt;
use chartcache_net::{Fetcher, Response};
use chartcache_sw::{FetchEvent, CACHE_DATE_HEADER};
use clap::Args;
use http::{HeaderName, HeaderValue, Method};

use crate::host::Host;

/// Arguments for the fetch command.
#[derive(Args)]
pub(crate) struct FetchArgs {
    /// URLs to request, in order.
    #[arg(required = true)]
    urls: Vec<String>,

    /// Request header as `name:value`. Repeatable.
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request method.
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Print response bodies.
    #[arg(short, long)]
    body: bool,
}

impl FetchArgs {
    /// Route each URL through the active worker, falling back to the network
    /// for requests it does not intercept.
    pub(crate) async fn execute(self, host: &mut Host) -> anyhow::Result<()> {
        let method = Method::from_bytes(self.method.to_uppercase().as_bytes())
            .map_err(|e| anyhow!("invalid method `{}`: {e}", self.method))?;
        let headers = self
            .headers
            .iter()
            .map(|raw| parse_header(raw))
            .collect::<anyhow::Result<Vec<_>>>()?;

        host.start().await?;
        let worker = host
            .registration
            .active()
            .await
            .ok_or_not_found("active worker")?;

        for url in &self.urls {
            let mut event = FetchEvent::new(method.clone(), url.as_str());
            for (name, value) in &headers {
                event = event.header(name.clone(), value.clone());
            }

            let (source, response) = match host.registration.fetch(&event).await {
                Some(response) => (worker.version().to_string(), response),
                None => {
                    let request = event.to_request()?;
                    ("network".to_string(), host.network().fetch(request).await?)
                }
            };
            print_response(url, &source, &response, self.body);
        }

        host.flush_events();
        Ok(())
    }
}

fn print_response(url: &str, source: &str, response: &Response, with_body: bool) {
    let stamp = response
        .header(CACHE_DATE_HEADER)
        .map(|date| format!(", stored {date}"))
        .unwrap_or_default();
    println!(
        "{url} -> {} {} ({} bytes via {source}{stamp})",
        response.status.as_u16(),
        response.status_text,
        response.body.len()
    );
    if with_body {
        println!("{}", String::from_utf8_lossy(&response.body));
    }
}

/// Split `name:value`, trimming whitespace around the value.
fn parse_header(raw: &str) -> anyhow::Result<(HeaderName, HeaderValue)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("header `{raw}` is not in name:value form");
    };
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|e| anyhow!("invalid header name in `{raw}`: {e}"))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|e| anyhow!("invalid header value in `{raw}`: {e}"))?;
    Ok((name, value))
}
