use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::KeyValueStore;

pub const SYNC_STATE_KEY: &str = "wayfinder:sync_state";

/// Persisted sync policy and bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncState {
    pub auto_sync: bool,
    pub wifi_only: bool,
    pub last_sync: Option<DateTime<Utc>>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            auto_sync: true,
            wifi_only: false,
            last_sync: None,
        }
    }
}

impl SyncState {
    /// Load the persisted state; a missing entry yields the defaults.
    pub async fn load(kv: &dyn KeyValueStore) -> Result<Self> {
        match kv.get(SYNC_STATE_KEY).await? {
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(|err| Error::read(SYNC_STATE_KEY, err))
            }
            None => Ok(Self::default()),
        }
    }

    pub async fn save(&self, kv: &dyn KeyValueStore) -> Result<()> {
        let bytes = serde_json::to_vec(self).map_err(|err| Error::write(SYNC_STATE_KEY, err))?;
        kv.set(SYNC_STATE_KEY, bytes).await
    }
}
