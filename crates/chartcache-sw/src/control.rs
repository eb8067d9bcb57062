//! Commands posted by foreground pages.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::classifier::RequestClassifier;
use crate::store::CacheStorage;
use crate::Result;

/// A recognised control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Activate the waiting worker without waiting for pages to close.
    SkipWaiting,
    /// Drop every cached songs-list entry.
    ClearSongsCache,
}

impl ControlMessage {
    /// Read a message payload. Anything without a known `type` is `None`.
    pub fn parse(payload: &Value) -> Option<Self> {
        match payload.get("type")?.as_str()? {
            "SKIP_WAITING" => Some(ControlMessage::SkipWaiting),
            "CLEAR_SONGS_CACHE" => Some(ControlMessage::ClearSongsCache),
            other => {
                debug!(message_type = other, "Ignoring unknown message");
                None
            }
        }
    }

    /// JSON form, as a page would post it.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// What handling a message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// The worker asked to skip waiting.
    SkipWaitingRequested,
    /// List entries were removed from the runtime partition.
    Purged { removed: usize },
    /// Unknown or malformed message.
    Ignored,
}

/// Delete every runtime entry whose request path is a songs-list path.
///
/// A missing partition is not created.
pub async fn purge_list_entries(
    classifier: &RequestClassifier,
    storage: &dyn CacheStorage,
    runtime_name: &str,
) -> Result<usize> {
    if !storage.has(runtime_name).await? {
        return Ok(0);
    }

    let cache = storage.open(runtime_name).await?;
    let mut removed = 0;
    for key in cache.keys().await? {
        if classifier.is_list_path(key.url().path()) && cache.delete(&key).await? {
            debug!(key = %key, "Purged");
            removed += 1;
        }
    }

    info!(partition = runtime_name, removed, "Cleared songs cache");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_key::CacheKey;
    use crate::store::{Cache, MemoryCacheStorage};
    use crate::test_support::{json, test_config};
    use chartcache_net::Request;
    use serde_json::json;
    use url::Url;

    fn key(url: &str) -> CacheKey {
        CacheKey::for_request(&Request::get(Url::parse(url).unwrap()))
    }

    #[test]
    fn test_parse_known_messages() {
        assert_eq!(
            ControlMessage::parse(&json!({"type": "SKIP_WAITING"})),
            Some(ControlMessage::SkipWaiting)
        );
        assert_eq!(
            ControlMessage::parse(&json!({"type": "CLEAR_SONGS_CACHE", "extra": 1})),
            Some(ControlMessage::ClearSongsCache)
        );
    }

    #[test]
    fn test_parse_ignores_unknown() {
        assert_eq!(ControlMessage::parse(&json!({"type": "RELOAD"})), None);
        assert_eq!(ControlMessage::parse(&json!({"kind": "SKIP_WAITING"})), None);
        assert_eq!(ControlMessage::parse(&json!("SKIP_WAITING")), None);
        assert_eq!(ControlMessage::parse(&json!({"type": 3})), None);
    }

    #[test]
    fn test_to_value_round_trips() {
        let value = ControlMessage::ClearSongsCache.to_value();
        assert_eq!(value, json!({"type": "CLEAR_SONGS_CACHE"}));
        assert_eq!(ControlMessage::parse(&value), Some(ControlMessage::ClearSongsCache));
    }

    #[tokio::test]
    async fn test_purge_removes_only_list_entries() {
        let config = test_config();
        let classifier = RequestClassifier::new(&config);
        let storage = MemoryCacheStorage::new();
        let runtime = storage.open("lesongs-runtime").await.unwrap();
        for url in [
            "https://app.example/rest/v1/LeSongs?select=*",
            "https://app.example/rest/v1/LeSongs?select=id&order=votes.desc",
            "https://app.example/rest/v1/votes?device=eq.abc",
        ] {
            runtime.put(&key(url), json("[]")).await.unwrap();
        }

        let removed = purge_list_entries(&classifier, &storage, "lesongs-runtime")
            .await
            .unwrap();

        assert_eq!(removed, 2);
        let remaining = runtime.keys().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].url().path(), "/rest/v1/votes");
    }

    #[tokio::test]
    async fn test_purge_without_partition_creates_nothing() {
        let classifier = RequestClassifier::new(&test_config());
        let storage = MemoryCacheStorage::new();

        let removed = purge_list_entries(&classifier, &storage, "lesongs-runtime")
            .await
            .unwrap();

        assert_eq!(removed, 0);
        assert!(!storage.has("lesongs-runtime").await.unwrap());
    }
}
