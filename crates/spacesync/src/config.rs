//! Facade configuration.

use serde::{Deserialize, Serialize};

use spacesync_sync::{HeadSyncConfig, StreamConfig};

use crate::error::{Result, SpaceSyncError};

/// Configuration for [`SpaceSyncFacade`](crate::SpaceSyncFacade).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use spacesync::SpaceSyncConfig;
///
/// let config = SpaceSyncConfig::from_json(r#"{ "head_sync": { "fan_out": 8 } }"#).unwrap();
/// assert_eq!(config.head_sync.fan_out, 8);
/// assert_eq!(config.head_sync.compact_threshold, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceSyncConfig {
    /// Range reconciliation.
    pub head_sync: HeadSyncConfig,
    /// Object streams.
    pub stream: StreamConfig,
    /// Changes queued per peer before the oldest are dropped.
    pub max_pending_per_peer: usize,
}

impl Default for SpaceSyncConfig {
    fn default() -> Self {
        Self {
            head_sync: HeadSyncConfig::default(),
            stream: StreamConfig::default(),
            max_pending_per_peer: 1024,
        }
    }
}

impl SpaceSyncConfig {
    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SpaceSyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.head_sync.fan_out < 2 {
            return Err(SpaceSyncError::Config("head_sync.fan_out must be at least 2".into()));
        }
        if self.head_sync.max_rounds == 0 {
            return Err(SpaceSyncError::Config("head_sync.max_rounds must be positive".into()));
        }
        if self.stream.channel_capacity == 0 {
            return Err(SpaceSyncError::Config("stream.channel_capacity must be positive".into()));
        }
        Ok(())
    }
}
