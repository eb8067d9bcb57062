//! CLI configuration file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chartcache_common::{LogConfig, ResultExt};
use chartcache_net::LoaderConfig;
use chartcache_sw::CacheConfig;
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "chartcache";
const CONFIG_FILE: &str = "config.json";
const DATABASE_FILE: &str = "cache.db";

/// Settings for the `chartcache` binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Cache policy handed to every worker.
    pub cache: CacheConfig,

    /// Logging setup.
    pub log: LogConfig,

    /// SQLite database file. Defaults to the platform data directory.
    pub database_path: Option<PathBuf>,

    /// Network client settings.
    pub network: NetworkConfig,
}

/// Outgoing HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub user_agent: String,
    /// Per-request timeout in seconds. Unset means none.
    pub timeout_secs: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("chartcache/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: Some(30),
        }
    }
}

impl NetworkConfig {
    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            user_agent: self.user_agent.clone(),
            default_timeout: self.timeout_secs.map(Duration::from_secs),
            ..LoaderConfig::default()
        }
    }
}

impl AppConfig {
    /// Load from `path`, or from the default location.
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> chartcache_common::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let raw = std::fs::read_to_string(&path)
            .config_context(format!("cannot read {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&raw)
            .config_context(format!("cannot parse {}", path.display()))?;
        Ok(config)
    }

    /// Database file to open.
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| data_dir().join(DATABASE_FILE))
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

/// Get data directory, with fallback
fn data_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        return data_dir.join(APP_DIR);
    }

    PathBuf::from(".chartcache")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartcache_common::ChartCacheError;
    use tempfile::tempdir;

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "cache": {"origin": "https://app.example/", "network_timeout_ms": 5000},
                "log": {"level": "debug"},
                "database_path": "/tmp/chartcache-test.db"
            }"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();

        assert_eq!(config.cache.origin.as_str(), "https://app.example/");
        assert_eq!(config.cache.network_timeout_ms, Some(5000));
        assert_eq!(config.cache.runtime_name, "lesongs-runtime");
        assert_eq!(config.log.level, tracing::Level::DEBUG);
        assert_eq!(config.database_path(), PathBuf::from("/tmp/chartcache-test.db"));
        assert_eq!(config.network.timeout_secs, Some(30));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let result = AppConfig::load(Some(&dir.path().join("absent.json")));
        assert!(matches!(result, Err(ChartCacheError::Config { .. })));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(AppConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_default_database_path() {
        let config = AppConfig::default();
        assert!(config.database_path().ends_with("chartcache/cache.db")
            || config.database_path().ends_with(".chartcache/cache.db"));
    }
}
