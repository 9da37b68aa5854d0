//! Broadcasting view updates to consumers.

use crate::view::SyncView;
use crossbeam_channel::{bounded, Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Unique identifier for a view watcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatcherId(pub u64);

/// Receiving end of a view watch.
pub struct ViewWatcher {
    pub id: WatcherId,
    receiver: Receiver<SyncView>,
}

impl ViewWatcher {
    /// Receive the next view (blocking).
    pub fn recv(&self) -> Result<SyncView, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a view (non-blocking).
    pub fn try_recv(&self) -> Result<SyncView, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<SyncView, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything queued and return the most recent view.
    pub fn latest(&self) -> Option<SyncView> {
        self.receiver.try_iter().last()
    }
}

/// Fans views out to watchers, dropping any whose buffer overflows.
pub struct ViewBroadcaster {
    watchers: RwLock<HashMap<WatcherId, Sender<SyncView>>>,
    next_id: AtomicU64,
    buffer_size: usize,
}

impl ViewBroadcaster {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            watchers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer_size,
        }
    }

    /// Register a watcher and prime it with `current`.
    pub fn watch(&self, current: SyncView) -> ViewWatcher {
        let id = WatcherId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(self.buffer_size);
        let _ = sender.try_send(current);

        self.watchers.write().insert(id, sender);

        ViewWatcher { id, receiver }
    }

    pub fn unwatch(&self, id: WatcherId) {
        self.watchers.write().remove(&id);
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.read().len()
    }

    /// Send `view` to every watcher. Full or disconnected watchers are removed.
    pub fn broadcast(&self, view: &SyncView) {
        if self.watchers.read().is_empty() {
            return;
        }

        let mut to_remove = Vec::new();

        {
            let watchers = self.watchers.read();
            for (id, sender) in watchers.iter() {
                if sender.try_send(view.clone()).is_err() {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut watchers = self.watchers.write();
            for id in to_remove {
                debug!(watcher = id.0, "dropping view watcher");
                watchers.remove(&id);
            }
        }
    }
}
