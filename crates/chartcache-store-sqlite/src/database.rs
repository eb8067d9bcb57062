use std::path::Path;

use bytes::Bytes;
use chartcache_net::Response;
use chartcache_sw::{CacheKey, StoreError};
use chrono::Utc;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use url::Url;

/// Database schema version for migrations
const SCHEMA_VERSION: i32 = 2;

pub(crate) fn backend(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Initialize or open the cache database
pub fn init_database(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path).map_err(|e| {
        StoreError::Unavailable(format!("Failed to open cache database: {}", e))
    })?;
    prepare(conn)
}

/// Open a throwaway database that lives as long as the connection
pub fn init_in_memory() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory().map_err(|e| StoreError::Unavailable(e.to_string()))?;
    prepare(conn)
}

fn prepare(conn: Connection) -> Result<Connection, StoreError> {
    conn.execute("PRAGMA foreign_keys = ON", []).map_err(backend)?;

    let table_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get::<_, i32>(0).map(|count| count > 0),
        )
        .unwrap_or(false);

    let version: i32 = if table_exists {
        conn.query_row(
            "SELECT version FROM schema_version ORDER BY id DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(backend)?
        .unwrap_or(0)
    } else {
        0
    };

    if version > SCHEMA_VERSION {
        return Err(StoreError::Unavailable(format!(
            "cache database schema {} is newer than supported {}",
            version, SCHEMA_VERSION
        )));
    }
    if version < 1 {
        create_schema_v1(&conn)?;
    }
    if version < 2 {
        migrate_v2(&conn)?;
    }

    Ok(conn)
}

/// Create initial schema (version 1)
fn create_schema_v1(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            version INTEGER NOT NULL,
            applied_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS partitions (
            name TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS entries (
            partition TEXT NOT NULL REFERENCES partitions(name) ON DELETE CASCADE,
            cache_key TEXT NOT NULL,
            url TEXT NOT NULL,
            method TEXT NOT NULL,
            status INTEGER NOT NULL,
            status_text TEXT NOT NULL,
            headers TEXT NOT NULL,
            body BLOB NOT NULL,
            stored_at INTEGER NOT NULL,
            PRIMARY KEY (partition, cache_key)
        );

        CREATE INDEX IF NOT EXISTS idx_entries_partition ON entries(partition);
        "#,
    )
    .map_err(|e| StoreError::Backend(format!("Failed to create schema: {}", e)))?;

    record_version(conn, 1)
}

/// Version 2: the activation marker
fn migrate_v2(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS activation (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version TEXT NOT NULL,
            activated_at INTEGER NOT NULL
        );
        "#,
    )
    .map_err(|e| StoreError::Backend(format!("Failed to migrate schema to v2: {}", e)))?;

    record_version(conn, 2)
}

fn record_version(conn: &Connection, version: i32) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?, ?)",
        params![version, Utc::now().timestamp()],
    )
    .map_err(backend)?;
    Ok(())
}

/// Version recorded by the last successful activation
pub fn active_version(conn: &Connection) -> Result<Option<String>, StoreError> {
    conn.query_row("SELECT version FROM activation WHERE id = 1", [], |row| row.get(0))
        .optional()
        .map_err(backend)
}

pub fn set_active_version(conn: &Connection, version: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO activation (id, version, activated_at) VALUES (1, ?, ?)",
        params![version, Utc::now().timestamp()],
    )
    .map_err(backend)?;
    Ok(())
}

/// Create a partition if it does not exist
pub fn ensure_partition(conn: &Connection, name: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?, ?)",
        params![name, Utc::now().timestamp()],
    )
    .map_err(backend)?;
    Ok(())
}

pub fn partition_exists(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    conn.query_row(
        "SELECT COUNT(*) FROM partitions WHERE name = ?",
        params![name],
        |row| row.get::<_, i64>(0).map(|count| count > 0),
    )
    .map_err(backend)
}

/// Delete a partition; its entries go with it
pub fn delete_partition(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    let deleted = conn
        .execute("DELETE FROM partitions WHERE name = ?", params![name])
        .map_err(backend)?;
    Ok(deleted > 0)
}

pub fn list_partitions(conn: &Connection) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT name FROM partitions ORDER BY name")
        .map_err(backend)?;
    let names = stmt
        .query_map([], |row| row.get(0))
        .map_err(backend)?
        .collect::<Result<Vec<String>, _>>()
        .map_err(backend)?;
    Ok(names)
}

/// Insert or replace an entry
pub fn put_entry(
    conn: &Connection,
    partition: &str,
    key: &CacheKey,
    response: &Response,
) -> Result<(), StoreError> {
    ensure_partition(conn, partition)?;
    conn.execute(
        r#"
        INSERT OR REPLACE INTO entries
            (partition, cache_key, url, method, status, status_text, headers, body, stored_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            partition,
            key.as_str(),
            key.url().as_str(),
            key.method().as_str(),
            response.status.as_u16(),
            response.status_text,
            encode_headers(&response.headers),
            response.body.as_ref(),
            Utc::now().timestamp_millis(),
        ],
    )
    .map_err(backend)?;
    Ok(())
}

struct EntryRow {
    status: u16,
    status_text: String,
    headers: String,
    body: Vec<u8>,
}

pub fn get_entry(
    conn: &Connection,
    partition: &str,
    key: &CacheKey,
) -> Result<Option<Response>, StoreError> {
    let row = conn
        .query_row(
            "SELECT status, status_text, headers, body FROM entries WHERE partition = ? AND cache_key = ?",
            params![partition, key.as_str()],
            |row| {
                Ok(EntryRow {
                    status: row.get(0)?,
                    status_text: row.get(1)?,
                    headers: row.get(2)?,
                    body: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(backend)?;

    row.map(|row| decode_response(key.as_str(), row)).transpose()
}

pub fn delete_entry(conn: &Connection, partition: &str, key: &CacheKey) -> Result<bool, StoreError> {
    let deleted = conn
        .execute(
            "DELETE FROM entries WHERE partition = ? AND cache_key = ?",
            params![partition, key.as_str()],
        )
        .map_err(backend)?;
    Ok(deleted > 0)
}

pub fn list_keys(conn: &Connection, partition: &str) -> Result<Vec<CacheKey>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT cache_key, url, method FROM entries WHERE partition = ? ORDER BY cache_key")
        .map_err(backend)?;
    let rows = stmt
        .query_map(params![partition], |row: &Row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .map_err(backend)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(backend)?;

    rows.into_iter()
        .map(|(key, url, method)| {
            let url = Url::parse(&url).map_err(|e| corrupt(&key, e))?;
            let method = Method::from_bytes(method.as_bytes()).map_err(|e| corrupt(&key, e))?;
            Ok(CacheKey::from_parts(key, url, method))
        })
        .collect()
}

pub fn count_entries(conn: &Connection, partition: &str) -> Result<usize, StoreError> {
    conn.query_row(
        "SELECT COUNT(*) FROM entries WHERE partition = ?",
        params![partition],
        |row| row.get::<_, i64>(0),
    )
    .map(|count| count as usize)
    .map_err(backend)
}

fn corrupt(key: &str, reason: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Stored header value: text when UTF-8, raw bytes otherwise
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StoredValue {
    Text(String),
    Bytes(Vec<u8>),
}

/// Headers as a JSON array of `[name, value]` pairs, preserving repeats and order
fn encode_headers(headers: &HeaderMap) -> String {
    let pairs: Vec<(&str, StoredValue)> = headers
        .iter()
        .map(|(name, value)| {
            let value = match std::str::from_utf8(value.as_bytes()) {
                Ok(text) => StoredValue::Text(text.to_string()),
                Err(_) => StoredValue::Bytes(value.as_bytes().to_vec()),
            };
            (name.as_str(), value)
        })
        .collect();
    serde_json::to_string(&pairs).unwrap_or_else(|_| "[]".to_string())
}

fn decode_headers(key: &str, raw: &str) -> Result<HeaderMap, StoreError> {
    let pairs: Vec<(String, StoredValue)> =
        serde_json::from_str(raw).map_err(|e| corrupt(key, e))?;
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| corrupt(key, e))?;
        let value = match value {
            StoredValue::Text(text) => HeaderValue::from_bytes(text.as_bytes()),
            StoredValue::Bytes(bytes) => HeaderValue::from_bytes(&bytes),
        }
        .map_err(|e| corrupt(key, e))?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn decode_response(key: &str, row: EntryRow) -> Result<Response, StoreError> {
    let status = StatusCode::from_u16(row.status).map_err(|e| corrupt(key, e))?;
    let headers = decode_headers(key, &row.headers)?;
    let mut response = Response::new(status, headers, Bytes::from(row.body));
    response.status_text = row.status_text;
    Ok(response)
}
