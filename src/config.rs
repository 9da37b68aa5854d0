//! Coordinator configuration.

use crate::error::{Result, SyncError};
use crate::types::CollectionDescriptor;
use serde::{Deserialize, Serialize};

/// Coordinator configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Collection whose first snapshot or first error ends loading.
    /// Default: cigars
    pub primary: CollectionDescriptor,

    /// Collections subscribed for every identity, in open order.
    pub collections: Vec<CollectionDescriptor>,

    /// Max buffered views per watcher before it is dropped.
    /// Default: 64
    pub watcher_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            primary: CollectionDescriptor::Cigars,
            collections: CollectionDescriptor::ALL.to_vec(),
            watcher_buffer: 64,
        }
    }
}

impl SyncConfig {
    /// Parse a configuration from JSON, filling unspecified fields with defaults.
    pub fn from_json(s: &str) -> Result<Self> {
        let config: SyncConfig =
            serde_json::from_str(s).map_err(|e| SyncError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.collections.is_empty() {
            return Err(SyncError::InvalidConfig("no collections tracked".into()));
        }
        if !self.collections.contains(&self.primary) {
            return Err(SyncError::InvalidConfig(format!(
                "primary collection {} is not tracked",
                self.primary
            )));
        }
        for (i, d) in self.collections.iter().enumerate() {
            if self.collections[..i].contains(d) {
                return Err(SyncError::InvalidConfig(format!(
                    "collection {} listed twice",
                    d
                )));
            }
        }
        if self.watcher_buffer == 0 {
            return Err(SyncError::InvalidConfig("watcher buffer must be non-zero".into()));
        }
        Ok(())
    }
}
