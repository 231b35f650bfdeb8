//! Named cache store management.
//!
//! A cache store is a named bucket of response snapshots. Each deployed
//! version owns exactly one store; the rest are leftovers from earlier
//! versions waiting to be evicted.

use super::connection::CacheDb;
use crate::Error;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::OptionalExtension;

/// Handle to one named cache store.
///
/// Holding a handle does not create the store; only [`CacheDb::open_store`]
/// does. Writes to a store that was never opened, or was deleted, fail.
#[derive(Clone, Debug)]
pub struct CacheStore {
    pub(crate) db: CacheDb,
    pub(crate) name: String,
}

impl CacheStore {
    /// Name of the store, embedding its version tag.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl CacheDb {
    /// Get a handle to a store without creating it.
    pub fn store(&self, name: &str) -> CacheStore {
        CacheStore { db: self.clone(), name: name.to_string() }
    }

    /// Create the named store if missing and return a handle to it.
    pub async fn open_store(&self, name: &str) -> Result<CacheStore, Error> {
        let owned = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO cache_stores (name, created_at) VALUES (?1, ?2)",
                    params![owned, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(self.store(name))
    }

    /// List every store name, oldest first.
    pub async fn store_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM cache_stores ORDER BY created_at ASC, name ASC")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Check whether a store exists.
    pub async fn has_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM cache_stores WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a store and all of its entries.
    ///
    /// Returns false if the store did not exist.
    pub async fn delete_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM cache_stores WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every store.
    ///
    /// Returns the number of deleted stores.
    pub async fn delete_all_stores(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let deleted = conn.execute("DELETE FROM cache_stores", [])?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Record that the named store finished precaching.
    pub async fn mark_installed(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let updated = conn.execute(
                    "UPDATE cache_stores SET installed_at = ?2 WHERE name = ?1",
                    params![name, now],
                )?;
                if updated == 0 {
                    return Err(Error::CacheMiss(format!("store {name} does not exist")));
                }
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Whether the named store exists and completed a precache run.
    pub async fn is_installed(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let installed_at: Option<Option<String>> = conn
                    .query_row(
                        "SELECT installed_at FROM cache_stores WHERE name = ?1",
                        params![name],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(matches!(installed_at, Some(Some(_))))
            })
            .await
            .map_err(Error::from)
    }
}
