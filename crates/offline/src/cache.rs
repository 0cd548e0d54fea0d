//! Local catalog cache for offline lookups.
//!
//! The cache mirrors the remote catalog in SQLite and keeps an in-memory
//! index for lookups. Reads never touch the network; `refresh` is the only
//! path that does, and a failed refresh leaves the cache exactly as it was.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use sqlx::Row;

use backoffice_catalog::barcode::{self, BarcodeKey};
use backoffice_catalog::{CatalogItem, ItemId};
use backoffice_core::Money;

use crate::remote::{Query, RemoteStore};
use crate::store::{LocalStore, StoreError};

const TABLE: &str = "catalog_items";
const REFRESHED_AT_KEY: &str = "last_refreshed_at";

/// Outcome of a refresh attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The remote catalog replaced the local copy.
    Refreshed { items: usize, skipped_rows: usize },
    /// The remote could not be read; the previous contents are still served.
    Stale { reason: String },
}

#[derive(Debug, Clone)]
struct IndexedItem {
    item: CatalogItem,
    key: Option<BarcodeKey>,
}

#[derive(Debug, Default)]
struct Snapshot {
    items: Vec<IndexedItem>,
    by_id: HashMap<ItemId, usize>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Build from items, keeping the last occurrence of a duplicated id in
    /// the position of its first occurrence.
    fn build(items: Vec<CatalogItem>, refreshed_at: Option<DateTime<Utc>>) -> Self {
        let mut snapshot = Snapshot {
            refreshed_at,
            ..Snapshot::default()
        };
        for item in items {
            let indexed = IndexedItem {
                key: item.barcode_key(),
                item,
            };
            match snapshot.by_id.get(&indexed.item.id) {
                Some(&pos) => snapshot.items[pos] = indexed,
                None => {
                    snapshot.by_id.insert(indexed.item.id.clone(), snapshot.items.len());
                    snapshot.items.push(indexed);
                }
            }
        }
        snapshot
    }
}

/// Cache-first view of the product catalog.
pub struct CatalogCache {
    store: LocalStore,
    remote: Arc<dyn RemoteStore>,
    collection: String,
    snapshot: RwLock<Snapshot>,
    /// Held for a whole refresh so fetch, persist and publish of one refresh
    /// never interleave with another's.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl core::fmt::Debug for CatalogCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CatalogCache")
            .field("collection", &self.collection)
            .field("items", &self.len())
            .finish_non_exhaustive()
    }
}

impl CatalogCache {
    /// Open the cache, loading whatever a previous session persisted.
    pub async fn open(
        store: LocalStore,
        remote: Arc<dyn RemoteStore>,
        collection: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let cache = Self {
            store,
            remote,
            collection: collection.into(),
            snapshot: RwLock::new(Snapshot::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
        };

        let items = cache.load_items().await?;
        let refreshed_at = cache.load_refreshed_at().await?;
        tracing::debug!(items = items.len(), "catalog cache loaded from disk");
        *cache.write_snapshot() = Snapshot::build(items, refreshed_at);

        Ok(cache)
    }

    /// Pull the full catalog from the remote store and replace the local copy.
    ///
    /// Remote failures are absorbed and reported as [`RefreshOutcome::Stale`].
    /// Only a local storage failure is an error, and even then the previous
    /// contents stay in place.
    pub async fn refresh(&self) -> Result<RefreshOutcome, StoreError> {
        let _refreshing = self.refresh_lock.lock().await;
        let rows = match self.remote.select(&self.collection, &Query::all()).await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!(error = %err, "catalog refresh failed; serving cached catalog");
                return Ok(RefreshOutcome::Stale {
                    reason: err.to_string(),
                });
            }
        };

        let mut items = Vec::with_capacity(rows.len());
        let mut skipped_rows = 0;
        for row in &rows {
            match CatalogItem::from_row(row) {
                Ok(item) => items.push(item),
                Err(err) => {
                    skipped_rows += 1;
                    tracing::warn!(error = %err, "skipping malformed catalog row");
                }
            }
        }

        let now = Utc::now();
        let snapshot = Snapshot::build(items, Some(now));
        self.persist(&snapshot).await?;

        let count = snapshot.items.len();
        *self.write_snapshot() = snapshot;
        tracing::info!(items = count, skipped_rows, "catalog cache refreshed");

        Ok(RefreshOutcome::Refreshed {
            items: count,
            skipped_rows,
        })
    }

    /// Look up an item by a scanned or typed barcode.
    ///
    /// The code is reduced to its digits; an exact match is preferred, then a
    /// match ignoring leading zeros on both sides.
    pub fn lookup_by_barcode(&self, raw: &str) -> Option<CatalogItem> {
        let snapshot = self.read_snapshot();
        barcode::find_match(raw, &snapshot.items, |entry| entry.key.as_ref())
            .map(|entry| entry.item.clone())
    }

    pub fn get(&self, id: &ItemId) -> Option<CatalogItem> {
        let snapshot = self.read_snapshot();
        snapshot
            .by_id
            .get(id)
            .map(|&pos| snapshot.items[pos].item.clone())
    }

    /// Every cached item, in catalog order.
    pub fn all(&self) -> Vec<CatalogItem> {
        self.read_snapshot()
            .items
            .iter()
            .map(|entry| entry.item.clone())
            .collect()
    }

    /// Case-insensitive substring search over names and barcodes.
    pub fn search(&self, text: &str) -> Vec<CatalogItem> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return self.all();
        }
        self.read_snapshot()
            .items
            .iter()
            .filter(|entry| {
                entry.item.name.to_lowercase().contains(&needle)
                    || entry
                        .item
                        .barcode
                        .as_deref()
                        .is_some_and(|b| b.contains(&needle))
            })
            .map(|entry| entry.item.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read_snapshot().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// When the cache last took a remote catalog, if ever.
    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.read_snapshot().refreshed_at
    }

    /// Replace the persisted catalog in one transaction.
    async fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut tx = self.store.pool().begin().await?;

        sqlx::query("DELETE FROM catalog_items").execute(&mut *tx).await?;

        for (position, entry) in snapshot.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO catalog_items (id, barcode, name, unit_cost, position)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(entry.item.id.as_str())
            .bind(entry.item.barcode.as_deref())
            .bind(&entry.item.name)
            .bind(entry.item.unit_cost.cents())
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(at) = snapshot.refreshed_at {
            sqlx::query(
                r#"
                INSERT INTO catalog_meta (key, value)
                VALUES (?1, ?2)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value
                "#,
            )
            .bind(REFRESHED_AT_KEY)
            .bind(at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_items(&self) -> Result<Vec<CatalogItem>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, barcode, name, unit_cost
            FROM catalog_items
            ORDER BY position ASC
            "#,
        )
        .fetch_all(self.store.pool())
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let barcode: Option<String> = row.try_get("barcode")?;
            let name: String = row.try_get("name")?;
            let unit_cost: i64 = row.try_get("unit_cost")?;
            items.push(CatalogItem {
                id: ItemId::new(id),
                barcode,
                name,
                unit_cost: Money::from_cents(unit_cost),
            });
        }
        Ok(items)
    }

    async fn load_refreshed_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row = sqlx::query("SELECT value FROM catalog_meta WHERE key = ?1")
            .bind(REFRESHED_AT_KEY)
            .fetch_optional(self.store.pool())
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let value: String = row.try_get("value")?;
        DateTime::parse_from_rfc3339(&value)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| StoreError::corrupt(TABLE, format!("invalid {REFRESHED_AT_KEY}: {e}")))
    }

    fn read_snapshot(&self) -> std::sync::RwLockReadGuard<'_, Snapshot> {
        self.snapshot.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_snapshot(&self) -> std::sync::RwLockWriteGuard<'_, Snapshot> {
        self.snapshot.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
