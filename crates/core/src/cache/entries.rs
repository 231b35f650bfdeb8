//! Response snapshot storage within a cache store.
//!
//! Provides functions for storing, matching, listing and deleting response
//! snapshots. Writes are UPSERTs, so concurrent writers to one key resolve
//! last-write-wins.

use super::hash::compute_body_digest;
use super::stores::CacheStore;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, Row};

/// A stored response snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Normalized request key.
    pub key: String,
    /// Resolved absolute URL the response came from.
    pub url: String,
    pub status_code: u16,
    /// Cross-origin response whose status was not inspectable.
    pub opaque: bool,
    pub content_type: Option<String>,
    /// Response headers as a JSON array of `[name, value]` pairs.
    pub headers_json: Option<String>,
    pub body: Vec<u8>,
    /// SHA-256 of `body`.
    pub digest: String,
    pub stored_at: String,
}

impl CachedResponse {
    /// Build a snapshot, computing the body digest and timestamp.
    pub fn new(
        key: impl Into<String>, url: impl Into<String>, status_code: u16, opaque: bool, content_type: Option<String>,
        headers_json: Option<String>, body: Vec<u8>,
    ) -> Self {
        let digest = compute_body_digest(&body);
        Self {
            key: key.into(),
            url: url.into(),
            status_code,
            opaque,
            content_type,
            headers_json,
            body,
            digest,
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            url: row.get(1)?,
            status_code: row.get(2)?,
            opaque: row.get::<_, i32>(3)? == 1,
            content_type: row.get(4)?,
            headers_json: row.get(5)?,
            body: row.get(6)?,
            digest: row.get(7)?,
            stored_at: row.get(8)?,
        })
    }
}

/// Lookup options for [`CacheStore::get`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOptions {
    /// Match any entry whose key equals the requested key once both query
    /// strings are removed.
    pub ignore_search: bool,
}

impl MatchOptions {
    pub fn ignore_search() -> Self {
        Self { ignore_search: true }
    }
}

/// Strip the query string (and any fragment) from a cache key.
pub fn search_free_key(key: &str) -> &str {
    let end = key.find(['?', '#']).unwrap_or(key.len());
    &key[..end]
}

const SELECT_COLUMNS: &str =
    "SELECT key, url, status_code, opaque, content_type, headers_json, body, digest, stored_at FROM cache_entries";

fn insert_entry(conn: &rusqlite::Connection, store: &str, entry: &CachedResponse) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO cache_entries (
            store, key, search_free_key, url, status_code, opaque,
            content_type, headers_json, body, digest, stored_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(store, key) DO UPDATE SET
            search_free_key = excluded.search_free_key,
            url = excluded.url,
            status_code = excluded.status_code,
            opaque = excluded.opaque,
            content_type = excluded.content_type,
            headers_json = excluded.headers_json,
            body = excluded.body,
            digest = excluded.digest,
            stored_at = excluded.stored_at",
        params![
            store,
            &entry.key,
            search_free_key(&entry.key),
            &entry.url,
            entry.status_code,
            entry.opaque as i32,
            &entry.content_type,
            &entry.headers_json,
            &entry.body,
            &entry.digest,
            &entry.stored_at,
        ],
    )?;
    Ok(())
}

fn require_store(conn: &rusqlite::Connection, store: &str) -> Result<(), Error> {
    let exists: bool =
        conn.query_row("SELECT EXISTS(SELECT 1 FROM cache_stores WHERE name = ?1)", params![store], |row| row.get(0))?;
    if !exists {
        return Err(Error::CacheMiss(format!("store {store} does not exist")));
    }
    Ok(())
}

impl CacheStore {
    /// Insert or replace a snapshot.
    ///
    /// Fails with `CacheMiss` if the store is not open.
    pub async fn put(&self, entry: &CachedResponse) -> Result<(), Error> {
        let name = self.name.clone();
        let entry = entry.clone();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                require_store(conn, &name)?;
                insert_entry(conn, &name, &entry)?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Insert several snapshots atomically: either all are stored or none.
    pub async fn put_all(&self, entries: Vec<CachedResponse>) -> Result<(), Error> {
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                require_store(&tx, &name)?;
                for entry in &entries {
                    insert_entry(&tx, &name, entry)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get the snapshot stored for a key.
    ///
    /// Returns None if nothing matches.
    pub async fn get(&self, key: &str, options: MatchOptions) -> Result<Option<CachedResponse>, Error> {
        let name = self.name.clone();
        let key = key.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<Option<CachedResponse>, Error> {
                let result = if options.ignore_search {
                    conn.query_row(
                        &format!(
                            "{SELECT_COLUMNS} WHERE store = ?1 AND search_free_key = ?2
                             ORDER BY (key = ?2) DESC, stored_at ASC LIMIT 1"
                        ),
                        params![name, search_free_key(&key)],
                        CachedResponse::from_row,
                    )
                } else {
                    conn.query_row(
                        &format!("{SELECT_COLUMNS} WHERE store = ?1 AND key = ?2"),
                        params![name, key],
                        CachedResponse::from_row,
                    )
                };

                match result {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// List every key in the store, in insertion order.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT key FROM cache_entries WHERE store = ?1 ORDER BY rowid ASC")?;
                let keys = stmt
                    .query_map(params![name], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in the store.
    pub async fn len(&self) -> Result<u64, Error> {
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM cache_entries WHERE store = ?1", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete the snapshot stored for an exact key.
    ///
    /// Returns false if there was none.
    pub async fn delete(&self, key: &str) -> Result<bool, Error> {
        let name = self.name.clone();
        let key = key.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted =
                    conn.execute("DELETE FROM cache_entries WHERE store = ?1 AND key = ?2", params![name, key])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}
