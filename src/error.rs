//! Error types for the synchronization layer.

use crate::types::CollectionDescriptor;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for synchronization operations.
///
/// Stream and setup failures are carried as data inside [`crate::SyncView`],
/// so the type is cheap to clone and compare.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SyncError {
    /// Opening a subscription failed synchronously.
    #[error("Connection setup failed for {descriptor}: {reason}")]
    ConnectionSetup {
        descriptor: CollectionDescriptor,
        reason: String,
    },

    /// A live subscription reported a failure.
    #[error("Stream error on {descriptor}: {cause}")]
    Stream {
        descriptor: CollectionDescriptor,
        cause: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// The collection this error belongs to, if any.
    pub fn descriptor(&self) -> Option<CollectionDescriptor> {
        match self {
            SyncError::ConnectionSetup { descriptor, .. } | SyncError::Stream { descriptor, .. } => {
                Some(*descriptor)
            }
            _ => None,
        }
    }
}

/// Result type for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
