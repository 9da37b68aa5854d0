//! Synchronization coordinator tying identity, subscriptions and stores together.

use crate::collections::{CollectionStore, Collections};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::subscriptions::{
    Mailbox, SubscriptionHandle, SubscriptionId, SubscriptionTarget, SyncEvent, Transport,
    ViewBroadcaster, ViewWatcher,
};
use crate::types::{CollectionDescriptor, Document, Epoch, Identity};
use crate::view::{CollectionStatus, SyncView};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Lifecycle phase of the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No identity; nothing subscribed.
    Idle,
    /// Subscriptions open for the current identity.
    Active,
}

/// Keeps every tracked collection in sync for the current identity.
///
/// All state changes happen on the caller's thread: transports only fill
/// per-subscription mailboxes and queue a ready notice, and the pending
/// events are applied by [`process_pending`] or [`process_next`]. Each
/// mailbox holds the latest snapshot plus any unapplied failure, so a slow
/// consumer sees superseded snapshots skipped, never lost updates. Events
/// from an earlier epoch are discarded.
///
/// Transitions for a new identity run in a fixed order: cancel every open
/// handle, clear the stores, reset loading/error, then open one handle per
/// tracked collection.
///
/// [`process_pending`]: SyncCoordinator::process_pending
/// [`process_next`]: SyncCoordinator::process_next
pub struct SyncCoordinator<T: Transport> {
    transport: T,
    config: SyncConfig,

    collections: Collections,
    identity: Option<Identity>,
    epoch: Epoch,
    handles: Vec<SubscriptionHandle>,

    /// Aggregate state for the current epoch.
    loading: bool,
    error: Option<SyncError>,
    statuses: BTreeMap<CollectionDescriptor, CollectionStatus>,

    /// Ready notices; at most one per live mailbox.
    sender: Sender<Arc<Mailbox>>,
    receiver: Receiver<Arc<Mailbox>>,
    next_subscription: u64,

    watchers: ViewBroadcaster,
}

impl<T: Transport> SyncCoordinator<T> {
    /// Create an idle coordinator.
    pub fn new(transport: T, config: SyncConfig) -> Result<Self> {
        config.validate()?;

        let (sender, receiver) = unbounded();
        let watchers = ViewBroadcaster::new(config.watcher_buffer);

        Ok(Self {
            transport,
            config,
            collections: Collections::new(),
            identity: None,
            epoch: Epoch::default(),
            handles: Vec::new(),
            loading: true,
            error: None,
            statuses: BTreeMap::new(),
            sender,
            receiver,
            next_subscription: 1,
            watchers,
        })
    }

    // --- Lifecycle ---

    /// Switch to `identity`. `None` tears everything down to idle.
    ///
    /// Supplying the identity that is already active changes nothing.
    /// Returns the epoch in effect afterwards.
    pub fn set_identity(&mut self, identity: Option<Identity>) -> Epoch {
        if identity == self.identity {
            return self.epoch;
        }
        self.reinitialize(identity);
        self.epoch
    }

    /// Re-open every subscription for the current identity in a new epoch.
    ///
    /// No-op while idle.
    pub fn refresh(&mut self) -> Epoch {
        if self.identity.is_some() {
            let identity = self.identity.clone();
            self.reinitialize(identity);
        }
        self.epoch
    }

    /// Cancel all subscriptions and return to idle.
    pub fn shutdown(&mut self) {
        if self.identity.is_some() || !self.handles.is_empty() {
            self.reinitialize(None);
        }
    }

    fn reinitialize(&mut self, identity: Option<Identity>) {
        self.cancel_handles();

        // Every queued notice belongs to a cancelled epoch now.
        let purged = self.receiver.try_iter().count();
        if purged > 0 {
            debug!(epoch = self.epoch.0, notices = purged, "purged stale notices");
        }

        self.epoch = self.epoch.next();
        self.collections.clear_all();
        self.loading = true;
        self.error = None;
        self.statuses.clear();
        self.identity = identity;

        match self.identity.clone() {
            Some(identity) => self.open_subscriptions(&identity),
            None => info!(epoch = self.epoch.0, "sync idle"),
        }

        self.publish();
    }

    fn cancel_handles(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        let count = self.handles.len();
        for handle in self.handles.drain(..) {
            handle.cancel();
        }
        info!(epoch = self.epoch.0, handles = count, "subscriptions cancelled");
    }

    fn open_subscriptions(&mut self, identity: &Identity) {
        let descriptors = self.config.collections.clone();

        for descriptor in descriptors {
            self.statuses.insert(descriptor, CollectionStatus::Pending);

            let target = SubscriptionTarget::new(descriptor, identity.clone());
            let id = SubscriptionId(self.next_subscription);
            self.next_subscription += 1;

            match SubscriptionHandle::open(
                &self.transport,
                id,
                self.epoch,
                &target,
                self.sender.clone(),
            ) {
                Ok(handle) => self.handles.push(handle),
                Err(e) => {
                    warn!(
                        epoch = self.epoch.0,
                        collection = %descriptor,
                        error = %e,
                        "subscription setup failed"
                    );
                    let error = if matches!(e, SyncError::ConnectionSetup { .. }) {
                        e
                    } else {
                        SyncError::ConnectionSetup {
                            descriptor,
                            reason: e.to_string(),
                        }
                    };
                    self.record_failure(descriptor, error);
                }
            }
        }

        info!(
            epoch = self.epoch.0,
            identity = %identity,
            handles = self.handles.len(),
            "sync epoch opened"
        );
    }

    // --- Event application ---

    /// Apply every event pending so far. Returns how many were applied;
    /// stale events are discarded and not counted.
    pub fn process_pending(&mut self) -> usize {
        let queued = self.receiver.len();
        let mut applied = 0;
        for _ in 0..queued {
            match self.receiver.try_recv() {
                Ok(mailbox) => applied += self.drain_mailbox(&mailbox),
                Err(_) => break,
            }
        }
        applied
    }

    /// Wait up to `timeout` for one subscription to have pending events and
    /// apply them.
    ///
    /// Returns false on timeout or if everything pending was stale.
    pub fn process_next(&mut self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(mailbox) => self.drain_mailbox(&mailbox) > 0,
            Err(_) => false,
        }
    }

    fn drain_mailbox(&mut self, mailbox: &Mailbox) -> usize {
        if mailbox.epoch() != self.epoch {
            debug!(
                event_epoch = mailbox.epoch().0,
                epoch = self.epoch.0,
                collection = %mailbox.descriptor(),
                "discarding stale mailbox"
            );
            return 0;
        }
        let mut applied = 0;
        for event in mailbox.take() {
            if self.handle_event(event) {
                applied += 1;
            }
        }
        applied
    }

    /// Apply a single event. Returns false if it was rejected as stale.
    pub fn handle_event(&mut self, event: SyncEvent) -> bool {
        if !self.is_current(&event) {
            debug!(
                event_epoch = event.epoch().0,
                epoch = self.epoch.0,
                collection = %event.descriptor(),
                "discarding stale event"
            );
            return false;
        }

        trace!(epoch = self.epoch.0, collection = %event.descriptor(), "applying event");

        match event {
            SyncEvent::Snapshot {
                descriptor,
                documents,
                ..
            } => self.apply_snapshot(descriptor, documents),
            SyncEvent::Failed {
                descriptor, cause, ..
            } => {
                warn!(
                    epoch = self.epoch.0,
                    collection = %descriptor,
                    cause = %cause,
                    "stream error"
                );
                self.record_failure(descriptor, SyncError::Stream { descriptor, cause });
            }
        }

        self.publish();
        true
    }

    fn is_current(&self, event: &SyncEvent) -> bool {
        event.epoch() == self.epoch
            && self.identity.is_some()
            && self
                .handles
                .iter()
                .any(|h| h.descriptor == event.descriptor() && !h.is_cancelled())
    }

    fn apply_snapshot(&mut self, descriptor: CollectionDescriptor, documents: Vec<Document>) {
        let count = documents.len();
        self.collections.get(descriptor).replace(documents);

        let status = self.statuses.entry(descriptor).or_default();
        let snapshots = match status {
            CollectionStatus::Live { snapshots } => *snapshots + 1,
            _ => 1,
        };
        *status = CollectionStatus::Live { snapshots };

        if descriptor == self.config.primary && self.loading {
            self.loading = false;
            info!(epoch = self.epoch.0, collection = %descriptor, "initial load complete");
        }

        debug!(
            epoch = self.epoch.0,
            collection = %descriptor,
            documents = count,
            "snapshot applied"
        );
    }

    /// Mark `descriptor` failed. The first error of the epoch wins; a failed
    /// primary ends loading.
    fn record_failure(&mut self, descriptor: CollectionDescriptor, error: SyncError) {
        let cause = match &error {
            SyncError::Stream { cause, .. } => cause.clone(),
            SyncError::ConnectionSetup { reason, .. } => reason.clone(),
            other => other.to_string(),
        };
        self.statuses
            .insert(descriptor, CollectionStatus::Failed { cause });

        if self.error.is_none() {
            self.error = Some(error);
        }
        if descriptor == self.config.primary {
            self.loading = false;
        }
    }

    fn publish(&self) {
        if self.watchers.watcher_count() > 0 {
            self.watchers.broadcast(&self.view());
        }
    }

    // --- Consumer surface ---

    /// Current read-only projection.
    pub fn view(&self) -> SyncView {
        SyncView {
            epoch: self.epoch,
            identity: self.identity.clone(),
            humidors: self.collections.get(CollectionDescriptor::Humidors).read(),
            cigars: self.collections.get(CollectionDescriptor::Cigars).read(),
            journal_entries: self
                .collections
                .get(CollectionDescriptor::JournalEntries)
                .read(),
            loading: self.loading,
            error: self.error.clone(),
            statuses: self.statuses.clone(),
        }
    }

    /// Receive a fresh view after every transition, starting with the current one.
    pub fn watch(&self) -> ViewWatcher {
        self.watchers.watch(self.view())
    }

    pub fn store(&self, descriptor: CollectionDescriptor) -> &CollectionStore {
        self.collections.get(descriptor)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&SyncError> {
        self.error.as_ref()
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn phase(&self) -> Phase {
        if self.identity.is_some() {
            Phase::Active
        } else {
            Phase::Idle
        }
    }

    /// Number of open, uncancelled subscription handles.
    pub fn active_subscriptions(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_cancelled()).count()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: Transport> Drop for SyncCoordinator<T> {
    fn drop(&mut self) {
        self.cancel_handles();
    }
}
