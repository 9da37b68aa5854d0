//! Collection store implementation.

use crate::types::{CollectionDescriptor, Document, DocumentId};
use parking_lot::RwLock;
use std::sync::Arc;

/// Documents of one collection, as delivered by the latest snapshot.
///
/// Single writer (the coordinator), many readers. Readers get an
/// `Arc<[Document]>` so a concurrent `replace` never exposes a partial set.
pub struct CollectionStore {
    descriptor: CollectionDescriptor,
    documents: RwLock<Arc<[Document]>>,
}

impl CollectionStore {
    pub fn new(descriptor: CollectionDescriptor) -> Self {
        Self {
            descriptor,
            documents: RwLock::new(Arc::from(Vec::new())),
        }
    }

    pub fn descriptor(&self) -> CollectionDescriptor {
        self.descriptor
    }

    /// Overwrite the visible contents with exactly `documents`, keeping their order.
    pub(crate) fn replace(&self, documents: Vec<Document>) {
        *self.documents.write() = Arc::from(documents);
    }

    /// Drop all documents.
    pub(crate) fn clear(&self) {
        self.replace(Vec::new());
    }

    /// Current documents in snapshot order.
    pub fn read(&self) -> Arc<[Document]> {
        Arc::clone(&self.documents.read())
    }

    /// Look up a document by id.
    pub fn get(&self, id: &DocumentId) -> Option<Document> {
        self.documents.read().iter().find(|d| &d.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

/// The fixed set of stores, one per collection descriptor.
pub struct Collections {
    humidors: CollectionStore,
    cigars: CollectionStore,
    journal_entries: CollectionStore,
}

impl Collections {
    pub fn new() -> Self {
        Self {
            humidors: CollectionStore::new(CollectionDescriptor::Humidors),
            cigars: CollectionStore::new(CollectionDescriptor::Cigars),
            journal_entries: CollectionStore::new(CollectionDescriptor::JournalEntries),
        }
    }

    pub fn get(&self, descriptor: CollectionDescriptor) -> &CollectionStore {
        match descriptor {
            CollectionDescriptor::Humidors => &self.humidors,
            CollectionDescriptor::Cigars => &self.cigars,
            CollectionDescriptor::JournalEntries => &self.journal_entries,
        }
    }

    /// Reset every store to empty.
    pub(crate) fn clear_all(&self) {
        for d in CollectionDescriptor::ALL {
            self.get(d).clear();
        }
    }
}

impl Default for Collections {
    fn default() -> Self {
        Self::new()
    }
}
