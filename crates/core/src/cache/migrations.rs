//! Schema migrations for the cache database.
//!
//! Applied versions are recorded in `_migrations`. Each pending migration runs
//! in its own transaction together with its version row.

use super::Error;
use tokio_rusqlite::{Connection, params, rusqlite};

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Ordered by version; never edit an applied entry, append a new one.
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "cache_stores",
    sql: include_str!("../../migrations/001_cache_stores.sql"),
}];

/// Bring the schema up to the latest version.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )?;

        let applied = schema_version(conn)?;
        for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
            tracing::debug!(version = migration.version, name = migration.name, "applying cache migration");

            let tx = conn.transaction()?;
            tx.execute_batch(migration.sql)
                .map_err(|e| Error::MigrationFailed(format!("{} ({}): {e}", migration.version, migration.name)))?;
            tx.execute(
                "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                params![migration.version, chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
        }
        Ok(())
    })
    .await
    .map_err(Error::from)
}

fn schema_version(conn: &rusqlite::Connection) -> Result<i64, Error> {
    let version = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn tables(conn: &Connection) -> Vec<String> {
        conn.call(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
            let names = stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<String>, _>>()?;
            Ok::<_, rusqlite::Error>(names)
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_run_twice() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        let tables = tables(&conn).await;
        for expected in ["_migrations", "cache_entries", "cache_stores"] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
    }

    #[tokio::test]
    async fn test_records_latest_version() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();

        let version = conn
            .call(|conn| schema_version(conn))
            .await
            .unwrap();
        assert_eq!(version, MIGRATIONS.last().map(|m| m.version).unwrap_or_default());
    }
}
