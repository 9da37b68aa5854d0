//! In-memory collection stores.
//!
//! Each tracked collection gets one store holding the documents of the
//! latest snapshot, in snapshot order. Stores are fully replaced on every
//! delivery rather than patched.

mod store;

pub use store::{CollectionStore, Collections};
