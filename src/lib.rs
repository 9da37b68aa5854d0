//! # Humidor Sync
//!
//! Real-time synchronization of a user's collections (humidors, cigars,
//! journal entries) from a hosted document store into in-memory state.
//!
//! ## Core Concepts
//!
//! - **Transport**: the remote store's subscribe/cancel primitive
//! - **Subscription handles**: one live connection each, cancelled exactly once
//! - **Collection stores**: latest snapshot per collection, fully replaced on delivery
//! - **Coordinator**: opens a handle per collection for the current identity,
//!   aggregates a single loading/error state and tears everything down on
//!   identity change
//! - **Epochs**: every identity change starts a new epoch; events tagged with
//!   an older epoch are discarded
//!
//! ## Example
//!
//! ```ignore
//! use humidor_sync::{Identity, MemoryTransport, SyncConfig, SyncCoordinator};
//!
//! let transport = MemoryTransport::new();
//! let mut coordinator = SyncCoordinator::new(transport.clone(), SyncConfig::default())?;
//!
//! coordinator.set_identity(Some(Identity::new("u1")));
//! coordinator.process_pending();
//!
//! let view = coordinator.view();
//! if !view.loading {
//!     println!("{} cigars", view.cigars.len());
//! }
//!
//! // Logout
//! coordinator.set_identity(None);
//! ```

pub mod collections;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod memory;
pub mod subscriptions;
pub mod types;
pub mod view;

// Re-exports
pub use collections::{CollectionStore, Collections};
pub use config::SyncConfig;
pub use coordinator::{Phase, SyncCoordinator};
pub use error::{Result, SyncError};
pub use memory::{MemoryTransport, TransportOp};
pub use subscriptions::{
    CancelFn, EventSink, SubscriptionHandle, SubscriptionId, SubscriptionTarget, SyncEvent,
    Transport, ViewBroadcaster, ViewWatcher, WatcherId,
};
pub use types::*;
pub use view::{CollectionStatus, SyncView};
