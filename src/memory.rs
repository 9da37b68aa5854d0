//! In-process transport backed by plain maps.
//!
//! Stands in for a hosted document database: collections are keyed by
//! path, every write pushes a fresh snapshot to the live listeners of that
//! path, and failures or setup rejections can be injected per path.

use crate::error::{Result, SyncError};
use crate::subscriptions::{CancelFn, EventSink, SubscriptionTarget, Transport};
use crate::types::{Document, DocumentId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// One entry in the transport's operation log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportOp {
    Subscribed { path: String },
    Cancelled { path: String },
}

struct Listener {
    path: String,
    sink: EventSink,
}

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, Vec<Document>>,
    listeners: HashMap<u64, Listener>,
    rejected: HashMap<String, String>,
    op_log: Vec<TransportOp>,
    next_listener: u64,
}

impl MemoryState {
    fn push_snapshot(&self, path: &str) {
        let documents = self.collections.get(path).cloned().unwrap_or_default();
        for listener in self.listeners.values().filter(|l| l.path == path) {
            listener.sink.snapshot(documents.clone());
        }
    }
}

/// In-memory [`Transport`]. Clones share the same state.
#[derive(Clone)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
    initial_delivery: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            initial_delivery: true,
        }
    }

    /// Whether `subscribe` delivers the current contents right away.
    pub fn with_initial_delivery(mut self, enabled: bool) -> Self {
        self.initial_delivery = enabled;
        self
    }

    // --- Remote writes ---

    /// Replace the documents at `path` and notify its listeners.
    pub fn set_documents(&self, path: &str, documents: Vec<Document>) {
        let mut state = self.state.lock();
        state.collections.insert(path.to_string(), documents);
        state.push_snapshot(path);
    }

    /// Insert or update one document and notify listeners.
    pub fn put_document(&self, path: &str, document: Document) {
        let mut state = self.state.lock();
        let docs = state.collections.entry(path.to_string()).or_default();
        match docs.iter_mut().find(|d| d.id == document.id) {
            Some(existing) => *existing = document,
            None => docs.push(document),
        }
        state.push_snapshot(path);
    }

    /// Remove one document and notify listeners. Returns whether it existed.
    pub fn remove_document(&self, path: &str, id: &DocumentId) -> bool {
        let mut state = self.state.lock();
        let removed = match state.collections.get_mut(path) {
            Some(docs) => {
                let before = docs.len();
                docs.retain(|d| &d.id != id);
                docs.len() != before
            }
            None => false,
        };
        if removed {
            state.push_snapshot(path);
        }
        removed
    }

    /// Current stored documents at `path`.
    pub fn documents(&self, path: &str) -> Vec<Document> {
        self.state.lock().collections.get(path).cloned().unwrap_or_default()
    }

    // --- Fault injection ---

    /// Report a stream failure to every listener of `path`.
    pub fn fail(&self, path: &str, cause: &str) {
        let state = self.state.lock();
        for listener in state.listeners.values().filter(|l| l.path == path) {
            listener.sink.fail(cause);
        }
    }

    /// Make future subscribes on `path` fail synchronously.
    pub fn reject(&self, path: &str, reason: &str) {
        self.state
            .lock()
            .rejected
            .insert(path.to_string(), reason.to_string());
    }

    /// Undo a previous [`reject`](Self::reject).
    pub fn accept(&self, path: &str) {
        self.state.lock().rejected.remove(path);
    }

    // --- Introspection ---

    /// Number of listeners that have not been cancelled.
    pub fn active_listeners(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Sinks of the live listeners on `path`.
    pub fn sinks(&self, path: &str) -> Vec<EventSink> {
        self.state
            .lock()
            .listeners
            .values()
            .filter(|l| l.path == path)
            .map(|l| l.sink.clone())
            .collect()
    }

    /// Every subscribe and cancel, in the order they happened.
    pub fn op_log(&self) -> Vec<TransportOp> {
        self.state.lock().op_log.clone()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn subscribe(&self, target: &SubscriptionTarget, sink: EventSink) -> Result<CancelFn> {
        let mut state = self.state.lock();

        if let Some(reason) = state.rejected.get(&target.path) {
            return Err(SyncError::ConnectionSetup {
                descriptor: target.descriptor,
                reason: reason.clone(),
            });
        }

        let listener_id = state.next_listener;
        state.next_listener += 1;

        if self.initial_delivery {
            let documents = state
                .collections
                .get(&target.path)
                .cloned()
                .unwrap_or_default();
            sink.snapshot(documents);
        }

        trace!(path = %target.path, listener = listener_id, "listener registered");
        state.listeners.insert(
            listener_id,
            Listener {
                path: target.path.clone(),
                sink,
            },
        );
        state.op_log.push(TransportOp::Subscribed {
            path: target.path.clone(),
        });

        let shared = Arc::clone(&self.state);
        Ok(Box::new(move || {
            let mut state = shared.lock();
            if let Some(listener) = state.listeners.remove(&listener_id) {
                trace!(path = %listener.path, listener = listener_id, "listener removed");
                state.op_log.push(TransportOp::Cancelled {
                    path: listener.path,
                });
            }
        }))
    }
}
