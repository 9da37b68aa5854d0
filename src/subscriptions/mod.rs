//! Live collection subscriptions.
//!
//! This module provides:
//! - The [`Transport`] seam a remote document store plugs into
//! - Epoch-tagged [`EventSink`]s standing in for snapshot/error callbacks,
//!   coalescing undelivered updates so the latest snapshot always wins
//! - [`SubscriptionHandle`]s that own exactly one connection and cancel it once
//! - View watchers that fan consumer projections out over bounded channels
//!
//! # Example
//!
//! ```ignore
//! struct Remote;
//!
//! impl Transport for Remote {
//!     fn subscribe(&self, target: &SubscriptionTarget, sink: EventSink) -> Result<CancelFn> {
//!         let listener = remote_listen(&target.path, move |docs| { sink.snapshot(docs); });
//!         Ok(Box::new(move || listener.detach()))
//!     }
//! }
//! ```

mod types;
mod watchers;

pub use types::{
    CancelFn, EventSink, SubscriptionHandle, SubscriptionId, SubscriptionTarget, SyncEvent,
    Transport,
};
pub(crate) use types::Mailbox;
pub use watchers::{ViewBroadcaster, ViewWatcher, WatcherId};
