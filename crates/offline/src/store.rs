//! Durable local storage shared by the catalog cache and the pending queue.
//!
//! One SQLite database holds both, so a single file in the app data
//! directory is all the client needs to survive a restart.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

/// Local storage failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("local storage unavailable: {0:#}")]
    Unavailable(anyhow::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },
}

impl StoreError {
    pub(crate) fn corrupt(table: &'static str, err: impl core::fmt::Display) -> Self {
        Self::Corrupt {
            table,
            reason: format!("{err:#}"),
        }
    }
}

/// Handle to the local SQLite database.
///
/// Cheap to clone; clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct LocalStore {
    pool: SqlitePool,
}

impl LocalStore {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create data directory at {parent:?}"))
                .map_err(StoreError::Unavailable)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open local database at {path:?}"))
            .map_err(StoreError::Unavailable)?;

        Self::with_pool(pool).await
    }

    /// Open a private in-memory database (tests, ephemeral sessions).
    ///
    /// Every SQLite connection to `:memory:` is a separate database, so the
    /// pool is pinned to a single connection that never expires.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS catalog_items (
                id         TEXT PRIMARY KEY,
                barcode    TEXT NULL,
                name       TEXT NOT NULL,
                unit_cost  INTEGER NOT NULL,
                position   INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS catalog_meta (
                key    TEXT PRIMARY KEY,
                value  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_operations (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                id          TEXT NOT NULL UNIQUE,
                kind        TEXT NOT NULL,
                payload     TEXT NOT NULL,
                status      TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                attempts    INTEGER NOT NULL DEFAULT 0,
                last_error  TEXT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Resolve the default database path: `{app_data_dir}/backoffice/offline.db`.
pub fn default_db_path() -> anyhow::Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut h| {
                h.push(".local");
                h.push("share");
                h
            })
        })
        .context("failed to resolve OS app data directory - tried data_dir() and home_dir()/.local/share")?;

    Ok(base.join("backoffice").join("offline.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_has_schema() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('catalog_items', 'catalog_meta', 'pending_operations')",
        )
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(row.0, 3);
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let store = LocalStore::open_in_memory().await.unwrap();
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();
    }

    #[test]
    fn default_path_ends_in_app_dir() {
        if let Ok(path) = default_db_path() {
            assert!(path.ends_with("backoffice/offline.db"));
        }
    }
}
