//! Online/offline detection and change notification.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

/// A change of connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    WentOnline,
    WentOffline,
}

/// Handle returned by [`ConnectivityMonitor::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

type Listener = Arc<dyn Fn(Transition) + Send + Sync>;

/// Holds the current online flag and fans out transitions.
///
/// Callbacks registered with [`subscribe`](Self::subscribe) run synchronously
/// on the thread that reported the change; async consumers use
/// [`watch`](Self::watch) instead.
pub struct ConnectivityMonitor {
    state: watch::Sender<bool>,
    listeners: Mutex<Vec<(Subscription, Listener)>>,
    next_id: AtomicU64,
}

impl core::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("online", &self.is_online())
            .finish_non_exhaustive()
    }
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (state, _) = watch::channel(initially_online);
        Self {
            state,
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Record the latest observation.
    ///
    /// Returns the transition when the value actually changed; repeated
    /// observations of the same state notify nobody.
    pub fn set_online(&self, online: bool) -> Option<Transition> {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if !changed {
            return None;
        }

        let transition = if online {
            Transition::WentOnline
        } else {
            Transition::WentOffline
        };
        tracing::info!(?transition, "connectivity changed");

        // Snapshot so a listener may (un)subscribe without deadlocking.
        let listeners: Vec<Listener> = self
            .lock_listeners()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(transition);
        }

        Some(transition)
    }

    /// Register a callback invoked on every transition.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(Transition) + Send + Sync + 'static,
    {
        let id = Subscription(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().push((id, Arc::new(listener)));
        id
    }

    /// Remove a callback; unknown subscriptions are ignored.
    pub fn unsubscribe(&self, subscription: Subscription) {
        self.lock_listeners().retain(|(id, _)| *id != subscription);
    }

    /// Receiver that observes every change of the online flag.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Vec<(Subscription, Listener)>> {
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
