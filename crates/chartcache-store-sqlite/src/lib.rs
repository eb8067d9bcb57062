//! # chartcache SQLite store
//!
//! Durable [`CacheStorage`] for hosts that outlive a single process. All
//! partitions share one database file; each call runs on the blocking pool
//! against a mutex-guarded connection.

pub mod database;

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chartcache_net::Response;
use chartcache_sw::{Cache, CacheKey, CacheStorage, StoreError};
use rusqlite::Connection;
use tracing::debug;

type SharedConnection = Arc<Mutex<Connection>>;

/// Run `f` against the connection on the blocking pool.
async fn with_connection<T, F>(conn: &SharedConnection, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let guard = conn
            .lock()
            .map_err(|_| StoreError::Unavailable("cache database lock poisoned".to_string()))?;
        f(&*guard)
    })
    .await
    .map_err(|e| StoreError::Backend(format!("store task failed: {e}")))?
}

/// SQLite-backed partition factory.
#[derive(Clone)]
pub struct SqliteCacheStorage {
    conn: SharedConnection,
}

impl SqliteCacheStorage {
    /// Open or create the database at `path`.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = database::init_database(path)?;
        debug!(path = %path.display(), "Opened cache database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// A private database that disappears with this value.
    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: Arc::new(Mutex::new(database::init_in_memory()?)),
        })
    }

    /// Number of entries in a partition.
    pub async fn entry_count(&self, partition: &str) -> Result<usize, StoreError> {
        let partition = partition.to_string();
        with_connection(&self.conn, move |conn| {
            database::count_entries(conn, &partition)
        })
        .await
    }
}

#[async_trait]
impl CacheStorage for SqliteCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StoreError> {
        let partition = name.to_string();
        with_connection(&self.conn, move |conn| {
            database::ensure_partition(conn, &partition)
        })
        .await?;

        Ok(Arc::new(SqliteCache {
            name: name.to_string(),
            conn: Arc::clone(&self.conn),
        }))
    }

    async fn has(&self, name: &str) -> Result<bool, StoreError> {
        let partition = name.to_string();
        with_connection(&self.conn, move |conn| {
            database::partition_exists(conn, &partition)
        })
        .await
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let partition = name.to_string();
        with_connection(&self.conn, move |conn| {
            database::delete_partition(conn, &partition)
        })
        .await
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        with_connection(&self.conn, database::list_partitions).await
    }

    async fn active_version(&self) -> Result<Option<String>, StoreError> {
        with_connection(&self.conn, database::active_version).await
    }

    async fn set_active_version(&self, version: &str) -> Result<(), StoreError> {
        let version = version.to_string();
        with_connection(&self.conn, move |conn| {
            database::set_active_version(conn, &version)
        })
        .await
    }
}

/// One partition of a [`SqliteCacheStorage`].
pub struct SqliteCache {
    name: String,
    conn: SharedConnection,
}

#[async_trait]
impl Cache for SqliteCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_key(&self, key: &CacheKey) -> Result<Option<Response>, StoreError> {
        let (partition, key) = (self.name.clone(), key.clone());
        with_connection(&self.conn, move |conn| {
            database::get_entry(conn, &partition, &key)
        })
        .await
    }

    async fn put(&self, key: &CacheKey, response: Response) -> Result<(), StoreError> {
        let (partition, key) = (self.name.clone(), key.clone());
        with_connection(&self.conn, move |conn| {
            database::put_entry(conn, &partition, &key, &response)
        })
        .await
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, StoreError> {
        let (partition, key) = (self.name.clone(), key.clone());
        with_connection(&self.conn, move |conn| {
            database::delete_entry(conn, &partition, &key)
        })
        .await
    }

    async fn keys(&self) -> Result<Vec<CacheKey>, StoreError> {
        let partition = self.name.clone();
        with_connection(&self.conn, move |conn| database::list_keys(conn, &partition)).await
    }
}
