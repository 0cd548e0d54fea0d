//! `backoffice-offline`
//!
//! **Responsibility:** Offline-first data layer for the back-office client.
//!
//! This crate provides:
//! - A local catalog cache with tolerant barcode lookup
//! - A durable FIFO queue of writes made while offline
//! - Connectivity tracking and reconnect-triggered replay
//! - A status summary for the operator
//!
//! The backend stays the authority; the client only queues writes it could
//! not deliver yet.

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod context;
pub mod operation;
pub mod queue;
pub mod remote;
pub mod status;
pub mod store;
pub mod sync_engine;
pub mod sync_worker;

pub use cache::{CatalogCache, RefreshOutcome};
pub use config::{ConfigError, OfflineConfig};
pub use connectivity::{ConnectivityMonitor, Subscription, Transition};
pub use context::{OfflineContext, OpenError};
pub use operation::{OperationPayload, OperationStatus, PendingOperation};
pub use queue::PendingQueue;
pub use remote::{Filter, HttpRemote, InMemoryRemote, Query, RemoteError, RemoteStore};
pub use status::{StatusIndicator, StatusSnapshot};
pub use store::{LocalStore, StoreError};
pub use sync_engine::{
    ConnectivityState, DrainReport, DrainTrigger, SkipReason, SubmitOutcome, SyncEngine, SyncError,
    SyncEvent,
};
pub use sync_worker::{SyncWorker, SyncWorkerHandle};
