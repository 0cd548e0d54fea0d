//! Replays queued writes against the backend.
//!
//! The engine owns the write path ([`SyncEngine::submit`]) and the drain
//! ([`SyncEngine::drain`]). A drain walks the pending queue in FIFO order,
//! removes each operation the backend accepts and stops at the first
//! failure, leaving that operation and everything behind it queued for the
//! next trigger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};

use backoffice_core::{DomainError, OperationId};

use crate::cache::{CatalogCache, RefreshOutcome};
use crate::connectivity::ConnectivityMonitor;
use crate::operation::{OperationPayload, PendingOperation, RemoteWrite};
use crate::queue::PendingQueue;
use crate::remote::{RemoteError, RemoteStore};
use crate::store::StoreError;

/// Rejections an operation may collect before it is parked in the failed list.
pub const DEFAULT_MAX_REJECTIONS: u32 = 3;

const EVENT_CAPACITY: usize = 64;

/// Errors surfaced by the sync engine.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid operation: {0}")]
    Invalid(#[from] DomainError),
    #[error("operation rejected by backend: {0}")]
    Rejected(RemoteError),
}

/// What caused a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainTrigger {
    /// The operator asked for a sync.
    Manual,
    /// Connectivity came back.
    Reconnected,
    /// Pending work found when the worker started.
    Startup,
}

/// Why a drain did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another drain held the lock.
    AlreadyRunning,
    /// The backend did not answer its health check.
    Offline,
}

/// The operation a drain stopped at.
#[derive(Debug, Clone, PartialEq)]
pub struct StoppedOn {
    pub operation: OperationId,
    pub error: RemoteError,
    /// Moved to the failed list instead of staying at the head of the queue.
    pub parked: bool,
}

/// Outcome of one drain.
#[derive(Debug, Clone, PartialEq)]
pub struct DrainReport {
    pub trigger: DrainTrigger,
    pub replayed: usize,
    pub remaining: usize,
    pub stopped_on: Option<StoppedOn>,
    pub skipped: Option<SkipReason>,
}

impl DrainReport {
    fn skipped(trigger: DrainTrigger, reason: SkipReason) -> Self {
        Self {
            trigger,
            replayed: 0,
            remaining: 0,
            stopped_on: None,
            skipped: Some(reason),
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }
}

/// Result of [`SyncEngine::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The backend accepted the write right away.
    Applied(OperationId),
    /// The write was queued for a later drain.
    Queued(OperationId),
}

impl SubmitOutcome {
    pub fn id(&self) -> OperationId {
        match self {
            SubmitOutcome::Applied(id) | SubmitOutcome::Queued(id) => *id,
        }
    }
}

/// Notifications for UI and logging consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    DrainCompleted {
        trigger: DrainTrigger,
        replayed: usize,
        remaining: usize,
    },
    DrainStopped {
        trigger: DrainTrigger,
        operation: OperationId,
        error: RemoteError,
    },
    /// A queued write will never be applied as is. Callers that showed it
    /// optimistically should roll their state back.
    OperationRejected {
        operation: PendingOperation,
        error: RemoteError,
    },
}

/// Snapshot of connectivity and sync progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectivityState {
    pub is_online: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub is_syncing: bool,
}

/// Held while a drain runs; releases the lock on drop.
struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives pending operations to the backend.
pub struct SyncEngine {
    queue: PendingQueue,
    cache: Arc<CatalogCache>,
    remote: Arc<dyn RemoteStore>,
    monitor: Arc<ConnectivityMonitor>,
    draining: AtomicBool,
    /// Serializes `submit` so a direct write that falls back to the queue
    /// cannot land behind a later write.
    write_lock: Mutex<()>,
    last_sync: RwLock<Option<DateTime<Utc>>>,
    events: broadcast::Sender<SyncEvent>,
    max_rejections: u32,
}

impl core::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &self.state())
            .field("max_rejections", &self.max_rejections)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(
        queue: PendingQueue,
        cache: Arc<CatalogCache>,
        remote: Arc<dyn RemoteStore>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            queue,
            cache,
            remote,
            monitor,
            draining: AtomicBool::new(false),
            write_lock: Mutex::new(()),
            last_sync: RwLock::new(None),
            events,
            max_rejections: DEFAULT_MAX_REJECTIONS,
        }
    }

    /// Rejections tolerated before an operation is parked (minimum 1).
    pub fn with_max_rejections(mut self, max_rejections: u32) -> Self {
        self.max_rejections = max_rejections.max(1);
        self
    }

    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> ConnectivityState {
        ConnectivityState {
            is_online: self.monitor.is_online(),
            last_sync_time: self.last_sync_time(),
            is_syncing: self.is_syncing(),
        }
    }

    /// Record a write.
    ///
    /// When online with nothing queued ahead of it, the write goes straight to
    /// the backend. Otherwise, or if that attempt fails transiently, it is
    /// queued and [`SubmitOutcome::Queued`] returned. A write the backend
    /// rejects outright is returned as [`SyncError::Rejected`] and not queued.
    pub async fn submit(&self, payload: OperationPayload) -> Result<SubmitOutcome, SyncError> {
        payload.validate()?;
        let _write = self.write_lock.lock().await;
        let op = PendingOperation::new(payload);

        if self.monitor.is_online() && !self.is_syncing() && self.queue.is_empty().await? {
            match self.replay(&op).await {
                Ok(()) => {
                    self.touch_last_sync();
                    tracing::info!(id = %op.id, kind = op.kind(), "operation applied");
                    return Ok(SubmitOutcome::Applied(op.id));
                }
                Err(err) if err.is_permanent() => {
                    tracing::warn!(id = %op.id, kind = op.kind(), error = %err, "operation rejected");
                    return Err(SyncError::Rejected(err));
                }
                Err(err) => {
                    tracing::info!(id = %op.id, error = %err, "write deferred, queueing");
                    self.observe_failure(&err);
                }
            }
        }

        self.queue.push(&op).await?;
        tracing::info!(id = %op.id, kind = op.kind(), "operation queued");
        Ok(SubmitOutcome::Queued(op.id))
    }

    /// Replay every pending operation in FIFO order.
    ///
    /// Returns immediately with a skipped report if a drain is already
    /// running. After at least one successful replay the catalog is refreshed
    /// once and the last sync time updated.
    pub async fn drain(&self, trigger: DrainTrigger) -> Result<DrainReport, SyncError> {
        let Some(guard) = DrainGuard::acquire(&self.draining) else {
            tracing::debug!(?trigger, "drain already running, trigger ignored");
            return Ok(DrainReport::skipped(trigger, SkipReason::AlreadyRunning));
        };

        let pending = self.queue.list().await?;
        tracing::info!(?trigger, pending = pending.len(), "drain started");

        let mut report = DrainReport {
            trigger,
            replayed: 0,
            remaining: pending.len(),
            stopped_on: None,
            skipped: None,
        };

        for op in pending {
            match self.replay(&op).await {
                Ok(()) => {
                    self.queue.dequeue(op.id).await?;
                    report.replayed += 1;
                    report.remaining -= 1;
                    tracing::debug!(id = %op.id, kind = op.kind(), "operation replayed");
                }
                Err(err) => {
                    let parked = self.handle_failure(&op, &err).await?;
                    if parked {
                        report.remaining -= 1;
                    }
                    let _ = self.events.send(SyncEvent::DrainStopped {
                        trigger,
                        operation: op.id,
                        error: err.clone(),
                    });
                    report.stopped_on = Some(StoppedOn {
                        operation: op.id,
                        error: err,
                        parked,
                    });
                    break;
                }
            }
        }

        drop(guard);

        if report.replayed > 0 {
            match self.cache.refresh().await {
                Ok(RefreshOutcome::Refreshed { .. }) => {}
                Ok(RefreshOutcome::Stale { reason }) => {
                    tracing::warn!(%reason, "catalog refresh after drain failed");
                }
                Err(err) => tracing::error!(error = %err, "catalog refresh after drain failed"),
            }
            self.touch_last_sync();
            let _ = self.events.send(SyncEvent::DrainCompleted {
                trigger,
                replayed: report.replayed,
                remaining: report.remaining,
            });
        }

        tracing::info!(
            ?trigger,
            replayed = report.replayed,
            remaining = report.remaining,
            stopped = report.stopped_on.is_some(),
            "drain finished"
        );
        Ok(report)
    }

    /// Manual sync: probe the backend, then drain if it answers.
    pub async fn force_sync(&self) -> Result<DrainReport, SyncError> {
        let healthy = self.remote.health_check().await;
        self.monitor.set_online(healthy);
        if !healthy {
            tracing::info!("force sync requested while backend unreachable");
            return Ok(DrainReport::skipped(DrainTrigger::Manual, SkipReason::Offline));
        }
        self.drain(DrainTrigger::Manual).await
    }

    async fn replay(&self, op: &PendingOperation) -> Result<(), RemoteError> {
        match op.payload.to_remote_write(op.id) {
            RemoteWrite::Insert { collection, rows } => {
                self.remote.insert(collection, rows).await.map(|_| ())
            }
            RemoteWrite::Invoke { function, body } => {
                self.remote.invoke(function, body).await.map(|_| ())
            }
        }
    }

    /// Book a failed replay. Returns whether the operation was parked.
    async fn handle_failure(&self, op: &PendingOperation, err: &RemoteError) -> Result<bool, SyncError> {
        self.observe_failure(err);

        if !err.is_permanent() {
            self.queue.note_error(op.id, &err.to_string()).await?;
            tracing::warn!(id = %op.id, error = %err, "replay failed, will retry on next trigger");
            return Ok(false);
        }

        let attempts = self.queue.record_failure(op.id, &err.to_string()).await?.unwrap_or(0);
        if attempts < self.max_rejections {
            tracing::warn!(id = %op.id, attempts, error = %err, "replay rejected");
            return Ok(false);
        }

        let parked = self.queue.mark_failed(op.id, &err.to_string()).await?;
        if parked {
            tracing::error!(id = %op.id, kind = op.kind(), attempts, error = %err, "operation moved to failed list");
            let mut operation = op.clone();
            operation.attempts = attempts;
            operation.last_error = Some(err.to_string());
            let _ = self.events.send(SyncEvent::OperationRejected {
                operation,
                error: err.clone(),
            });
        }
        Ok(parked)
    }

    fn observe_failure(&self, err: &RemoteError) {
        if matches!(err, RemoteError::Unreachable(_)) {
            self.monitor.set_online(false);
        }
    }

    fn touch_last_sync(&self) {
        *self.last_sync.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tokio::sync::Notify;

    use crate::operation::LOSS_ENTRIES;
    use crate::remote::{Filter, InMemoryRemote, Query, RemoteCall};
    use crate::store::LocalStore;

    const PRODUCTS: &str = "products";

    /// Wraps [`InMemoryRemote`], failing chosen inserts by index and
    /// optionally pausing the first insert until released.
    struct ScriptedRemote {
        inner: InMemoryRemote,
        inserts: Mutex<usize>,
        fail_at: Mutex<HashMap<usize, RemoteError>>,
        gate: Option<(Notify, Notify)>,
    }

    impl ScriptedRemote {
        fn new() -> Self {
            let inner = InMemoryRemote::new();
            inner.seed(PRODUCTS, vec![json!({"id": 1, "barcode": "1", "name": "Item", "unit_cost": 1.0})]);
            Self {
                inner,
                inserts: Mutex::new(0),
                fail_at: Mutex::new(HashMap::new()),
                gate: None,
            }
        }

        fn gated() -> Self {
            Self {
                gate: Some((Notify::new(), Notify::new())),
                ..Self::new()
            }
        }

        fn fail_insert(&self, index: usize, err: RemoteError) {
            self.fail_at.lock().unwrap().insert(index, err);
        }

        fn inserted_refs(&self) -> Vec<String> {
            self.inner
                .calls()
                .into_iter()
                .filter_map(|call| match call {
                    RemoteCall::Insert(_, rows) => rows[0]["client_ref"].as_str().map(str::to_string),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl RemoteStore for ScriptedRemote {
        async fn select(&self, collection: &str, query: &Query) -> Result<Vec<Value>, RemoteError> {
            self.inner.select(collection, query).await
        }

        async fn insert(&self, collection: &str, rows: Vec<Value>) -> Result<Vec<Value>, RemoteError> {
            let index = {
                let mut n = self.inserts.lock().unwrap();
                *n += 1;
                *n
            };
            if let (Some((entered, release)), 1) = (&self.gate, index) {
                entered.notify_one();
                release.notified().await;
            }
            if let Some(err) = self.fail_at.lock().unwrap().remove(&index) {
                return Err(err);
            }
            self.inner.insert(collection, rows).await
        }

        async fn update(&self, collection: &str, filters: &[Filter], patch: Value) -> Result<Vec<Value>, RemoteError> {
            self.inner.update(collection, filters, patch).await
        }

        async fn delete(&self, collection: &str, filters: &[Filter]) -> Result<usize, RemoteError> {
            self.inner.delete(collection, filters).await
        }

        async fn invoke(&self, function: &str, body: Value) -> Result<Value, RemoteError> {
            self.inner.invoke(function, body).await
        }

        async fn health_check(&self) -> bool {
            self.inner.health_check().await
        }
    }

    fn entry(barcode: &str) -> OperationPayload {
        serde_json::from_value(json!({
            "kind": "create-entry-batch",
            "items": [{"barcode": barcode, "name": "Item", "qty": 1, "unit_cost": 150}]
        }))
        .unwrap()
    }

    fn rejected() -> RemoteError {
        RemoteError::Rejected {
            status: 422,
            message: "check constraint".into(),
        }
    }

    struct Harness {
        engine: Arc<SyncEngine>,
        queue: PendingQueue,
        monitor: Arc<ConnectivityMonitor>,
        remote: Arc<ScriptedRemote>,
    }

    async fn harness(remote: ScriptedRemote, online: bool) -> Harness {
        let store = LocalStore::open_in_memory().await.unwrap();
        let remote = Arc::new(remote);
        let cache = Arc::new(CatalogCache::open(store.clone(), remote.clone(), PRODUCTS).await.unwrap());
        let queue = PendingQueue::new(store);
        let monitor = Arc::new(ConnectivityMonitor::new(online));
        let engine = SyncEngine::new(queue.clone(), cache, remote.clone(), monitor.clone());
        Harness {
            engine: Arc::new(engine),
            queue,
            monitor,
            remote,
        }
    }

    async fn enqueue_all(queue: &PendingQueue, n: usize) -> Vec<OperationId> {
        let mut ids = Vec::new();
        for i in 0..n {
            ids.push(queue.enqueue(entry(&i.to_string())).await.unwrap());
        }
        ids
    }

    #[tokio::test]
    async fn drain_replays_in_fifo_order() {
        let h = harness(ScriptedRemote::new(), true).await;
        let ids = enqueue_all(&h.queue, 3).await;

        let report = h.engine.drain(DrainTrigger::Manual).await.unwrap();

        assert_eq!(report.replayed, 3);
        assert_eq!(report.remaining, 0);
        assert!(report.stopped_on.is_none());
        let expected: Vec<String> = ids.iter().map(ToString::to_string).collect();
        assert_eq!(h.remote.inserted_refs(), expected);
        assert!(h.queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn drain_stops_at_first_failure() {
        let h = harness(ScriptedRemote::new(), true).await;
        let ids = enqueue_all(&h.queue, 5).await;
        h.remote.fail_insert(3, RemoteError::Unavailable { status: 503, message: "busy".into() });

        let report = h.engine.drain(DrainTrigger::Manual).await.unwrap();

        assert_eq!(report.replayed, 2);
        assert_eq!(report.remaining, 3);
        let stopped = report.stopped_on.unwrap();
        assert_eq!(stopped.operation, ids[2]);
        assert!(!stopped.parked);

        let left: Vec<_> = h.queue.list().await.unwrap().into_iter().map(|op| op.id).collect();
        assert_eq!(left, ids[2..].to_vec());
        assert_eq!(h.queue.list().await.unwrap()[0].attempts, 0);
    }

    #[tokio::test]
    async fn overlapping_drain_is_skipped() {
        let h = harness(ScriptedRemote::gated(), true).await;
        enqueue_all(&h.queue, 2).await;

        let first = tokio::spawn({
            let engine = h.engine.clone();
            async move { engine.drain(DrainTrigger::Reconnected).await }
        });

        let (entered, release) = h.remote.gate.as_ref().unwrap();
        entered.notified().await;
        assert!(h.engine.is_syncing());

        let second = h.engine.drain(DrainTrigger::Manual).await.unwrap();
        assert_eq!(second.skipped, Some(SkipReason::AlreadyRunning));

        release.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.replayed, 2);
        assert!(!h.engine.is_syncing());
        assert_eq!(h.remote.inserted_refs().len(), 2);
    }

    #[tokio::test]
    async fn repeated_rejection_parks_operation() {
        let h = harness(ScriptedRemote::new(), true).await;
        let engine = Arc::new(
            Arc::into_inner(h.engine).unwrap().with_max_rejections(2),
        );
        let mut events = engine.events();
        let ids = enqueue_all(&h.queue, 2).await;

        h.remote.fail_insert(1, rejected());
        let report = engine.drain(DrainTrigger::Manual).await.unwrap();
        assert_eq!(report.replayed, 0);
        assert!(!report.stopped_on.unwrap().parked);
        assert_eq!(h.queue.list().await.unwrap()[0].attempts, 1);

        h.remote.fail_insert(2, rejected());
        let report = engine.drain(DrainTrigger::Manual).await.unwrap();
        assert!(report.stopped_on.unwrap().parked);
        assert_eq!(report.remaining, 1);

        let failed = h.queue.failed().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, ids[0]);

        let report = engine.drain(DrainTrigger::Manual).await.unwrap();
        assert_eq!(report.replayed, 1);

        let mut rejected_ids = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SyncEvent::OperationRejected { operation, .. } = event {
                rejected_ids.push(operation.id);
            }
        }
        assert_eq!(rejected_ids, vec![ids[0]]);
    }

    #[tokio::test]
    async fn transient_failures_never_park() {
        let h = harness(ScriptedRemote::new(), true).await;
        enqueue_all(&h.queue, 1).await;

        for i in 1..=5 {
            h.remote.fail_insert(i, RemoteError::Unavailable { status: 502, message: "gateway".into() });
            h.engine.drain(DrainTrigger::Manual).await.unwrap();
        }

        let op = h.queue.list().await.unwrap().remove(0);
        assert_eq!(op.attempts, 0);
        assert!(op.last_error.unwrap().contains("gateway"));
        assert_eq!(h.queue.failed_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn successful_drain_refreshes_catalog_once() {
        let h = harness(ScriptedRemote::new(), true).await;
        enqueue_all(&h.queue, 3).await;
        assert!(h.engine.last_sync_time().is_none());

        h.engine.drain(DrainTrigger::Reconnected).await.unwrap();

        assert_eq!(h.remote.inner.select_count(PRODUCTS), 1);
        assert!(h.engine.last_sync_time().is_some());
    }

    #[tokio::test]
    async fn drain_without_success_leaves_catalog_alone() {
        let h = harness(ScriptedRemote::new(), true).await;
        enqueue_all(&h.queue, 1).await;
        h.remote.fail_insert(1, RemoteError::Unreachable("refused".into()));

        h.engine.drain(DrainTrigger::Manual).await.unwrap();

        assert_eq!(h.remote.inner.select_count(PRODUCTS), 0);
        assert!(h.engine.last_sync_time().is_none());
        assert!(!h.monitor.is_online());
    }

    #[tokio::test]
    async fn submit_applies_directly_when_online_and_idle() {
        let h = harness(ScriptedRemote::new(), true).await;

        let outcome = h.engine.submit(entry("7894900011")).await.unwrap();

        assert!(matches!(outcome, SubmitOutcome::Applied(_)));
        assert!(h.queue.is_empty().await.unwrap());
        assert_eq!(h.remote.inner.rows(LOSS_ENTRIES).len(), 1);
        assert!(h.engine.last_sync_time().is_some());
    }

    #[tokio::test]
    async fn submit_queues_behind_pending_work() {
        let h = harness(ScriptedRemote::new(), true).await;
        let earlier = enqueue_all(&h.queue, 1).await;

        let outcome = h.engine.submit(entry("2")).await.unwrap();

        assert!(matches!(outcome, SubmitOutcome::Queued(_)));
        let ids: Vec<_> = h.queue.list().await.unwrap().into_iter().map(|op| op.id).collect();
        assert_eq!(ids, vec![earlier[0], outcome.id()]);
        assert!(h.remote.inserted_refs().is_empty());
    }

    #[tokio::test]
    async fn submit_queues_while_offline() {
        let h = harness(ScriptedRemote::new(), false).await;

        let outcome = h.engine.submit(entry("1")).await.unwrap();

        assert!(matches!(outcome, SubmitOutcome::Queued(_)));
        assert_eq!(h.queue.len().await.unwrap(), 1);
        assert!(h.remote.inserted_refs().is_empty());
    }

    #[tokio::test]
    async fn submit_queues_on_unreachable_and_goes_offline() {
        let h = harness(ScriptedRemote::new(), true).await;
        h.remote.fail_insert(1, RemoteError::Unreachable("timeout".into()));

        let outcome = h.engine.submit(entry("1")).await.unwrap();

        assert!(matches!(outcome, SubmitOutcome::Queued(_)));
        assert!(!h.monitor.is_online());
        assert_eq!(h.queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn overlapping_submits_keep_creation_order() {
        let h = harness(ScriptedRemote::gated(), true).await;
        h.remote.fail_insert(1, RemoteError::Unreachable("timeout".into()));

        let first = tokio::spawn({
            let engine = h.engine.clone();
            async move { engine.submit(entry("a")).await }
        });
        let (entered, release) = h.remote.gate.as_ref().unwrap();
        entered.notified().await;

        // Connectivity drops while the first write is still in flight.
        h.monitor.set_online(false);
        let second = tokio::spawn({
            let engine = h.engine.clone();
            async move { engine.submit(entry("b")).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(h.queue.is_empty().await.unwrap());

        release.notify_one();
        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert!(matches!(first, SubmitOutcome::Queued(_)));
        assert!(matches!(second, SubmitOutcome::Queued(_)));
        let queued: Vec<_> = h.queue.list().await.unwrap().into_iter().map(|op| op.id).collect();
        assert_eq!(queued, vec![first.id(), second.id()]);
    }

    #[tokio::test]
    async fn submit_returns_rejection_without_queueing() {
        let h = harness(ScriptedRemote::new(), true).await;
        h.remote.fail_insert(1, rejected());

        let err = h.engine.submit(entry("1")).await.unwrap_err();

        assert!(matches!(err, SyncError::Rejected(RemoteError::Rejected { status: 422, .. })));
        assert!(h.queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn submit_validates_payload() {
        let h = harness(ScriptedRemote::new(), false).await;
        let empty: OperationPayload =
            serde_json::from_value(json!({"kind": "create-entry-batch", "items": []})).unwrap();

        let err = h.engine.submit(empty).await.unwrap_err();

        assert!(matches!(err, SyncError::Invalid(_)));
        assert!(h.queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn force_sync_skips_when_backend_down() {
        let h = harness(ScriptedRemote::new(), true).await;
        enqueue_all(&h.queue, 1).await;
        h.remote.inner.set_reachable(false);

        let report = h.engine.force_sync().await.unwrap();

        assert_eq!(report.skipped, Some(SkipReason::Offline));
        assert!(!h.monitor.is_online());
        assert_eq!(h.queue.len().await.unwrap(), 1);

        h.remote.inner.set_reachable(true);
        let report = h.engine.force_sync().await.unwrap();
        assert_eq!(report.replayed, 1);
        assert!(h.engine.state().is_online);
    }
}
