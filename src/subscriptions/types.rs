//! Subscription types for live collection updates.

use crate::error::Result;
use crate::types::{CollectionDescriptor, Document, Epoch, Identity};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Everything a transport needs to address one collection for one identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionTarget {
    pub descriptor: CollectionDescriptor,
    pub identity: Identity,
    /// Resolved remote path (`users/{uid}/{collection}`).
    pub path: String,
}

impl SubscriptionTarget {
    pub fn new(descriptor: CollectionDescriptor, identity: Identity) -> Self {
        let path = descriptor.path(&identity);
        Self {
            descriptor,
            identity,
            path,
        }
    }
}

/// Events delivered from transports to the coordinator.
#[derive(Clone, Debug)]
pub enum SyncEvent {
    /// Full current document set of a collection.
    Snapshot {
        epoch: Epoch,
        descriptor: CollectionDescriptor,
        documents: Vec<Document>,
    },

    /// The live connection reported a failure.
    Failed {
        epoch: Epoch,
        descriptor: CollectionDescriptor,
        cause: String,
    },
}

impl SyncEvent {
    pub fn epoch(&self) -> Epoch {
        match self {
            SyncEvent::Snapshot { epoch, .. } | SyncEvent::Failed { epoch, .. } => *epoch,
        }
    }

    pub fn descriptor(&self) -> CollectionDescriptor {
        match self {
            SyncEvent::Snapshot { descriptor, .. } | SyncEvent::Failed { descriptor, .. } => {
                *descriptor
            }
        }
    }
}

/// Undelivered state of one subscription.
#[derive(Default)]
struct Pending {
    cancelled: bool,
    /// A ready notice for this mailbox is in the coordinator's queue.
    queued: bool,
    /// Latest snapshot not yet applied.
    snapshot: Option<Vec<Document>>,
    /// Earliest failure not yet applied.
    error: Option<String>,
    /// The failure arrived after the pending snapshot.
    error_last: bool,
}

/// Per-subscription latest-value slot.
///
/// A newer snapshot replaces an older pending one; a pending failure is
/// never replaced. At most one ready notice per mailbox is queued at a time.
pub(crate) struct Mailbox {
    epoch: Epoch,
    descriptor: CollectionDescriptor,
    pending: Mutex<Pending>,
}

impl Mailbox {
    fn new(epoch: Epoch, descriptor: CollectionDescriptor) -> Self {
        Self {
            epoch,
            descriptor,
            pending: Mutex::new(Pending::default()),
        }
    }

    pub(crate) fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub(crate) fn descriptor(&self) -> CollectionDescriptor {
        self.descriptor
    }

    /// Take everything pending, in the order it must be applied.
    pub(crate) fn take(&self) -> Vec<SyncEvent> {
        let (snapshot, error, error_last) = {
            let mut pending = self.pending.lock();
            pending.queued = false;
            (
                pending.snapshot.take(),
                pending.error.take(),
                std::mem::take(&mut pending.error_last),
            )
        };

        let snapshot = snapshot.map(|documents| SyncEvent::Snapshot {
            epoch: self.epoch,
            descriptor: self.descriptor,
            documents,
        });
        let error = error.map(|cause| SyncEvent::Failed {
            epoch: self.epoch,
            descriptor: self.descriptor,
            cause,
        });

        if error_last {
            snapshot.into_iter().chain(error).collect()
        } else {
            error.into_iter().chain(snapshot).collect()
        }
    }

    fn cancel(&self) {
        let mut pending = self.pending.lock();
        pending.cancelled = true;
        pending.snapshot = None;
        pending.error = None;
    }

    fn is_cancelled(&self) -> bool {
        self.pending.lock().cancelled
    }
}

/// Epoch-tagged delivery endpoint handed to a transport.
///
/// Plays the role of the `onSnapshot` / `onError` callback pair. Deliveries
/// coalesce in the subscription's mailbox until the coordinator drains it,
/// so nothing the coordinator still needs is ever refused. Once the owning
/// [`SubscriptionHandle`] is cancelled the sink goes inert.
#[derive(Clone)]
pub struct EventSink {
    mailbox: Arc<Mailbox>,
    notify: Sender<Arc<Mailbox>>,
}

impl EventSink {
    pub(crate) fn new(
        epoch: Epoch,
        descriptor: CollectionDescriptor,
        notify: Sender<Arc<Mailbox>>,
    ) -> Self {
        Self {
            mailbox: Arc::new(Mailbox::new(epoch, descriptor)),
            notify,
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.mailbox.epoch
    }

    pub fn descriptor(&self) -> CollectionDescriptor {
        self.mailbox.descriptor
    }

    /// Whether the owning handle has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.mailbox.is_cancelled()
    }

    /// Deliver a full snapshot. Returns false once cancelled.
    pub fn snapshot(&self, documents: Vec<Document>) -> bool {
        self.deliver(|pending| {
            pending.snapshot = Some(documents);
            pending.error_last = false;
        })
    }

    /// Report a stream failure. Returns false once cancelled.
    pub fn fail(&self, cause: impl Into<String>) -> bool {
        let cause = cause.into();
        self.deliver(|pending| {
            if pending.error.is_none() {
                pending.error = Some(cause);
            }
            pending.error_last = true;
        })
    }

    fn deliver(&self, update: impl FnOnce(&mut Pending)) -> bool {
        let mut pending = self.mailbox.pending.lock();
        if pending.cancelled {
            return false;
        }
        update(&mut *pending);
        if !pending.queued {
            pending.queued = true;
            if self.notify.send(Arc::clone(&self.mailbox)).is_err() {
                return false;
            }
        }
        true
    }

    #[cfg(test)]
    pub(crate) fn mailbox(&self) -> Arc<Mailbox> {
        Arc::clone(&self.mailbox)
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("epoch", &self.epoch())
            .field("descriptor", &self.descriptor())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Transport-side teardown for one live connection.
pub type CancelFn = Box<dyn FnOnce() + Send>;

/// The remote collection transport.
///
/// `subscribe` registers a live listener and returns immediately; snapshots
/// (including a prompt initial one) and failures flow through `sink`.
/// An `Err` is a synchronous setup failure and means no listener exists.
pub trait Transport: Send + Sync {
    fn subscribe(&self, target: &SubscriptionTarget, sink: EventSink) -> Result<CancelFn>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn subscribe(&self, target: &SubscriptionTarget, sink: EventSink) -> Result<CancelFn> {
        (**self).subscribe(target, sink)
    }
}

/// Handle owning one live connection and its cancellation.
///
/// `cancel` is idempotent and the transport's teardown runs exactly once.
/// Dropping the handle cancels it.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    pub epoch: Epoch,
    pub descriptor: CollectionDescriptor,
    pub path: String,
    mailbox: Arc<Mailbox>,
    cancel_fn: Mutex<Option<CancelFn>>,
}

impl SubscriptionHandle {
    /// Open a subscription on `transport`, tagging deliveries with `epoch`.
    pub(crate) fn open<T: Transport + ?Sized>(
        transport: &T,
        id: SubscriptionId,
        epoch: Epoch,
        target: &SubscriptionTarget,
        notify: Sender<Arc<Mailbox>>,
    ) -> Result<Self> {
        let sink = EventSink::new(epoch, target.descriptor, notify);
        let mailbox = Arc::clone(&sink.mailbox);
        let cancel_fn = transport.subscribe(target, sink)?;

        Ok(Self {
            id,
            epoch,
            descriptor: target.descriptor,
            path: target.path.clone(),
            mailbox,
            cancel_fn: Mutex::new(Some(cancel_fn)),
        })
    }

    /// Stop delivery. After this returns, the sink accepts nothing more.
    pub fn cancel(&self) {
        self.mailbox.cancel();
        if let Some(cancel_fn) = self.cancel_fn.lock().take() {
            cancel_fn();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.mailbox.is_cancelled()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("epoch", &self.epoch)
            .field("descriptor", &self.descriptor)
            .field("path", &self.path)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
