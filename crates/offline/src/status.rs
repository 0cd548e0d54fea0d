//! Offline status indicator: what the operator sees about connectivity and
//! pending work.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::CatalogCache;
use crate::queue::PendingQueue;
use crate::sync_engine::{DrainReport, SyncEngine, SyncError};

/// Everything the indicator shows, captured at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub is_online: bool,
    pub pending_count: usize,
    pub failed_count: usize,
    pub is_syncing: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub cache_size: usize,
}

impl StatusSnapshot {
    /// One-line summary, e.g. `offline · 2 pending · last sync 5 min ago`.
    pub fn render(&self, now: DateTime<Utc>) -> String {
        let mut parts = Vec::with_capacity(5);

        parts.push(if self.is_syncing {
            "syncing".to_string()
        } else if self.is_online {
            "online".to_string()
        } else {
            "offline".to_string()
        });

        if self.pending_count > 0 {
            parts.push(format!("{} pending", self.pending_count));
        }
        if self.failed_count > 0 {
            parts.push(format!("{} failed", self.failed_count));
        }

        parts.push(format!("{} items cached", self.cache_size));
        parts.push(format!("last sync {}", format_elapsed(self.last_sync_time, now)));

        parts.join(" · ")
    }
}

/// Human-readable age of the last sync.
pub fn format_elapsed(since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(since) = since else {
        return "never".to_string();
    };

    // Clock skew can put `since` slightly in the future.
    let secs = (now - since).num_seconds().max(0);
    match secs {
        0..60 => "just now".to_string(),
        60..3_600 => format!("{} min ago", secs / 60),
        3_600..86_400 => format!("{} h ago", secs / 3_600),
        _ => format!("{} d ago", secs / 86_400),
    }
}

/// Reads live state for the indicator and forwards the operator's
/// "sync now" action to the engine.
#[derive(Debug, Clone)]
pub struct StatusIndicator {
    engine: Arc<SyncEngine>,
    queue: PendingQueue,
    cache: Arc<CatalogCache>,
}

impl StatusIndicator {
    pub fn new(engine: Arc<SyncEngine>, queue: PendingQueue, cache: Arc<CatalogCache>) -> Self {
        Self { engine, queue, cache }
    }

    pub async fn snapshot(&self) -> Result<StatusSnapshot, SyncError> {
        let state = self.engine.state();
        Ok(StatusSnapshot {
            is_online: state.is_online,
            pending_count: self.queue.len().await?,
            failed_count: self.queue.failed_len().await?,
            is_syncing: state.is_syncing,
            last_sync_time: state.last_sync_time,
            cache_size: self.cache.len(),
        })
    }

    pub async fn render(&self) -> Result<String, SyncError> {
        Ok(self.snapshot().await?.render(Utc::now()))
    }

    pub async fn on_force_sync_requested(&self) -> Result<DrainReport, SyncError> {
        self.engine.force_sync().await
    }
}
