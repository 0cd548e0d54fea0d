//! Durable FIFO queue of writes awaiting remote confirmation.
//!
//! Entries are ordered by an autoincrement sequence column, so FIFO order
//! survives restarts and an operation moved back from the failed list
//! returns to its original place.

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::Row;

use backoffice_core::OperationId;

use crate::operation::{OperationPayload, OperationStatus, PendingOperation};
use crate::store::{LocalStore, StoreError};

const TABLE: &str = "pending_operations";

/// SQLite-backed pending operation queue.
///
/// Only the sync engine removes pending entries, and only after the backend
/// confirmed them.
#[derive(Debug, Clone)]
pub struct PendingQueue {
    store: LocalStore,
}

impl PendingQueue {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Append a new operation and persist it before returning its id.
    pub async fn enqueue(&self, payload: OperationPayload) -> Result<OperationId, StoreError> {
        let op = PendingOperation::new(payload);
        self.push(&op).await?;
        Ok(op.id)
    }

    /// Persist an already-built operation at the tail of the queue.
    pub async fn push(&self, op: &PendingOperation) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&op.payload)
            .context("failed to serialize operation payload")
            .map_err(|e| StoreError::corrupt(TABLE, e))?;

        sqlx::query(
            r#"
            INSERT INTO pending_operations (id, kind, payload, status, created_at, attempts, last_error)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(op.id.to_string())
        .bind(op.kind())
        .bind(payload)
        .bind(op.status.as_str())
        .bind(op.created_at.to_rfc3339())
        .bind(op.attempts as i64)
        .bind(op.last_error.as_deref())
        .execute(self.store.pool())
        .await?;

        tracing::debug!(id = %op.id, kind = op.kind(), "operation queued");
        Ok(())
    }

    /// Remove a pending operation. Returns whether anything was removed;
    /// unknown ids are a no-op.
    pub async fn dequeue(&self, id: OperationId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM pending_operations WHERE id = ?1 AND status = 'pending'")
            .bind(id.to_string())
            .execute(self.store.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All pending operations in FIFO order.
    pub async fn list(&self) -> Result<Vec<PendingOperation>, StoreError> {
        self.list_by_status(OperationStatus::Pending).await
    }

    /// Operations parked after repeated rejections, oldest first.
    pub async fn failed(&self) -> Result<Vec<PendingOperation>, StoreError> {
        self.list_by_status(OperationStatus::Failed).await
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        self.count(OperationStatus::Pending).await
    }

    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }

    pub async fn failed_len(&self) -> Result<usize, StoreError> {
        self.count(OperationStatus::Failed).await
    }

    /// Count a replay the backend rejected. Returns the new attempt count,
    /// or `None` if the operation is gone.
    pub async fn record_failure(&self, id: OperationId, error: &str) -> Result<Option<u32>, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE pending_operations
            SET attempts = attempts + 1,
                last_error = ?2
            WHERE id = ?1
            RETURNING attempts
            "#,
        )
        .bind(id.to_string())
        .bind(error)
        .fetch_optional(self.store.pool())
        .await?;

        match row {
            Some(row) => {
                let attempts: i64 = row.try_get("attempts")?;
                Ok(Some(attempts.max(0) as u32))
            }
            None => Ok(None),
        }
    }

    /// Remember why the last replay failed without spending an attempt.
    pub async fn note_error(&self, id: OperationId, error: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE pending_operations SET last_error = ?2 WHERE id = ?1")
            .bind(id.to_string())
            .bind(error)
            .execute(self.store.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Park a pending operation in the failed list.
    pub async fn mark_failed(&self, id: OperationId, reason: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE pending_operations
            SET status = 'failed',
                last_error = ?2
            WHERE id = ?1
              AND status = 'pending'
            "#,
        )
        .bind(id.to_string())
        .bind(reason)
        .execute(self.store.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a failed operation back into the queue at its original position,
    /// with a fresh attempt budget.
    pub async fn retry_failed(&self, id: OperationId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE pending_operations
            SET status = 'pending',
                attempts = 0,
                last_error = NULL
            WHERE id = ?1
              AND status = 'failed'
            "#,
        )
        .bind(id.to_string())
        .execute(self.store.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop a failed operation for good (operator decision).
    pub async fn discard_failed(&self, id: OperationId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM pending_operations WHERE id = ?1 AND status = 'failed'")
            .bind(id.to_string())
            .execute(self.store.pool())
            .await?;
        if result.rows_affected() > 0 {
            tracing::warn!(%id, "failed operation discarded");
        }
        Ok(result.rows_affected() > 0)
    }

    async fn list_by_status(&self, status: OperationStatus) -> Result<Vec<PendingOperation>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, payload, status, created_at, attempts, last_error
            FROM pending_operations
            WHERE status = ?1
            ORDER BY seq ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(self.store.pool())
        .await?;

        rows.into_iter()
            .map(|row| row_to_operation(row).map_err(|e| StoreError::corrupt(TABLE, e)))
            .collect()
    }

    async fn count(&self, status: OperationStatus) -> Result<usize, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_operations WHERE status = ?1")
            .bind(status.as_str())
            .fetch_one(self.store.pool())
            .await?;
        Ok(count.max(0) as usize)
    }
}

/// Map a database row into a `PendingOperation`.
fn row_to_operation(row: sqlx::sqlite::SqliteRow) -> anyhow::Result<PendingOperation> {
    let id_str: String = row.try_get("id")?;
    let id = id_str
        .parse::<OperationId>()
        .context("invalid id in pending_operations")?;

    let payload_str: String = row.try_get("payload")?;
    let payload: OperationPayload = serde_json::from_str(&payload_str)
        .with_context(|| format!("invalid payload for operation {id}"))?;

    let status_str: String = row.try_get("status")?;
    let status = OperationStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("unknown status '{status_str}' for operation {id}"))?;

    let created_at_str: String = row.try_get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .context("invalid created_at in pending_operations")?;

    let attempts: i64 = row.try_get("attempts")?;
    let last_error: Option<String> = row.try_get("last_error")?;

    Ok(PendingOperation {
        id,
        payload,
        created_at,
        status,
        attempts: attempts.max(0) as u32,
        last_error,
    })
}
