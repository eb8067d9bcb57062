//! Cache key derivation.
//!
//! A key is `origin + pathname + search + "__" + METHOD + "__" + headers`, where
//! the headers render as a JSON object with sorted lower-case names. Two
//! requests share a key exactly when method, URL (including query) and header
//! set agree; header insertion order does not matter.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chartcache_net::Request;
use http::{HeaderMap, Method};
use serde_json::{Map, Value};
use url::Url;

const SEPARATOR: &str = "__";

/// Stable identifier of a cached request.
///
/// Keeps the parsed URL and method next to the key string so sweeps can
/// inspect the request without reparsing the key. Equality and hashing only
/// look at the key string.
#[derive(Debug, Clone)]
pub struct CacheKey {
    key: String,
    url: Url,
    method: Method,
}

impl CacheKey {
    /// Derive the key of a request.
    pub fn for_request(request: &Request) -> Self {
        Self::compute(&request.method, &request.url, &request.headers)
    }

    /// Derive the key from request parts.
    pub fn compute(method: &Method, url: &Url, headers: &HeaderMap) -> Self {
        let mut key = url_part(url);
        key.push_str(SEPARATOR);
        key.push_str(method.as_str());
        key.push_str(SEPARATOR);
        key.push_str(&serialize_headers(headers));

        Self {
            key,
            url: url.clone(),
            method: method.clone(),
        }
    }

    /// Rebuild a key loaded from a store. The key string is trusted as-is.
    pub fn from_parts(key: String, url: Url, method: Method) -> Self {
        Self { key, url, method }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for CacheKey {}

impl std::hash::Hash for CacheKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

/// `origin + pathname + search`. The fragment never reaches the network and is dropped.
fn url_part(url: &Url) -> String {
    let mut out = url.origin().ascii_serialization();
    out.push_str(url.path());
    match url.query() {
        Some(query) if !query.is_empty() => {
            out.push('?');
            out.push_str(query);
        }
        _ => {}
    }
    out
}

/// Canonical JSON object of the header set.
///
/// Repeated names join their values with `", "` in insertion order. A value
/// that is not UTF-8 renders as an array of its bytes, so distinct values
/// never share a rendering.
fn serialize_headers(headers: &HeaderMap) -> String {
    let mut sorted: BTreeMap<&str, Vec<u8>> = BTreeMap::new();
    for (name, value) in headers.iter() {
        match sorted.entry(name.as_str()) {
            Entry::Occupied(mut joined) => {
                let joined = joined.get_mut();
                joined.extend_from_slice(b", ");
                joined.extend_from_slice(value.as_bytes());
            }
            Entry::Vacant(slot) => {
                slot.insert(value.as_bytes().to_vec());
            }
        }
    }

    let mut object = Map::new();
    for (name, value) in sorted {
        object.insert(name.to_string(), value_json(value));
    }
    Value::Object(object).to_string()
}

fn value_json(bytes: Vec<u8>) -> Value {
    match String::from_utf8(bytes) {
        Ok(text) => Value::String(text),
        Err(e) => Value::Array(e.into_bytes().into_iter().map(Value::from).collect()),
    }
}
