//! Background worker: connectivity probing and reconnect-triggered drains.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::connectivity::ConnectivityMonitor;
use crate::queue::PendingQueue;
use crate::remote::RemoteStore;
use crate::sync_engine::{DrainTrigger, SyncEngine};

/// Default time between health checks.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Probes the backend on a fixed interval and drains the queue whenever the
/// client comes back online.
pub struct SyncWorker {
    engine: Arc<SyncEngine>,
    monitor: Arc<ConnectivityMonitor>,
    remote: Arc<dyn RemoteStore>,
    queue: PendingQueue,
    probe_interval: Duration,
    shutdown: Arc<Notify>,
}

/// Handle to a running [`SyncWorker`].
#[derive(Debug)]
pub struct SyncWorkerHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl SyncWorkerHandle {
    /// Ask the worker to stop after its current step.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Stop the worker and wait for it to finish.
    pub async fn stop(self) -> Result<(), tokio::task::JoinError> {
        self.shutdown();
        self.task.await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl SyncWorker {
    pub fn new(
        engine: Arc<SyncEngine>,
        monitor: Arc<ConnectivityMonitor>,
        remote: Arc<dyn RemoteStore>,
        queue: PendingQueue,
    ) -> Self {
        Self {
            engine,
            monitor,
            remote,
            queue,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn with_probe_interval(mut self, probe_interval: Duration) -> Self {
        self.probe_interval = probe_interval;
        self
    }

    /// Spawn the worker on the current tokio runtime.
    ///
    /// On start it drains any work left from a previous session if the client
    /// is online. Afterwards every probe tick feeds the connectivity monitor,
    /// and every offline to online edge, whoever reported it, runs a drain.
    pub fn start(self) -> SyncWorkerHandle {
        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(self.run());
        SyncWorkerHandle { shutdown, task }
    }

    async fn run(self) {
        tracing::info!(probe_interval = ?self.probe_interval, "sync worker started");

        let mut online = self.monitor.watch();
        online.borrow_and_update();

        if self.monitor.is_online() {
            match self.queue.is_empty().await {
                Ok(false) => self.drain(DrainTrigger::Startup).await,
                Ok(true) => {}
                Err(err) => tracing::error!(error = %err, "could not inspect pending queue"),
            }
        }

        let mut probe = tokio::time::interval(self.probe_interval);
        probe.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    tracing::info!("sync worker received shutdown signal");
                    break;
                }
                _ = probe.tick() => {
                    let healthy = self.remote.health_check().await;
                    tracing::debug!(healthy, "connectivity probe");
                    self.monitor.set_online(healthy);
                }
                changed = online.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *online.borrow_and_update() {
                        self.drain(DrainTrigger::Reconnected).await;
                    }
                }
            }
        }

        tracing::info!("sync worker stopped");
    }

    async fn drain(&self, trigger: DrainTrigger) {
        if let Err(err) = self.engine.drain(trigger).await {
            tracing::error!(?trigger, error = %err, "drain failed");
        }
    }
}
