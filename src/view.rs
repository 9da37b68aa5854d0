//! Read-only projection of the synchronized state.

use crate::error::SyncError;
use crate::types::{CollectionDescriptor, Document, Epoch, Identity};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-collection delivery status within the current epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CollectionStatus {
    /// Subscribed (or idle), nothing delivered yet.
    Pending,
    /// At least one snapshot applied.
    Live { snapshots: u64 },
    /// Setup or stream failure. Documents already received are kept.
    Failed { cause: String },
}

impl Default for CollectionStatus {
    fn default() -> Self {
        CollectionStatus::Pending
    }
}

/// What the rendering layer sees.
///
/// Recomputed after every coordinator transition. Collections are shared
/// snapshots, so cloning a view is cheap.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncView {
    pub epoch: Epoch,
    pub identity: Option<Identity>,
    pub humidors: Arc<[Document]>,
    pub cigars: Arc<[Document]>,
    pub journal_entries: Arc<[Document]>,
    /// True until the primary collection reports once.
    pub loading: bool,
    /// First failure of the epoch.
    pub error: Option<SyncError>,
    pub statuses: BTreeMap<CollectionDescriptor, CollectionStatus>,
}

impl SyncView {
    /// The idle projection: nothing subscribed, still loading.
    pub fn idle(epoch: Epoch) -> Self {
        Self {
            epoch,
            identity: None,
            humidors: Arc::from(Vec::new()),
            cigars: Arc::from(Vec::new()),
            journal_entries: Arc::from(Vec::new()),
            loading: true,
            error: None,
            statuses: BTreeMap::new(),
        }
    }

    pub fn collection(&self, descriptor: CollectionDescriptor) -> &[Document] {
        match descriptor {
            CollectionDescriptor::Humidors => &self.humidors,
            CollectionDescriptor::Cigars => &self.cigars,
            CollectionDescriptor::JournalEntries => &self.journal_entries,
        }
    }

    pub fn status(&self, descriptor: CollectionDescriptor) -> CollectionStatus {
        self.statuses.get(&descriptor).cloned().unwrap_or_default()
    }
}
