//! Connectivity-driven refresh of the cached dataset.
//!
//! Status moves `Idle -> Syncing -> Success | Error -> Idle` and is broadcast
//! to every subscriber. At most one sync runs at a time; a request made while
//! one is active is dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::ResourceCache;
use crate::download::DownloadOrchestrator;
use crate::error::{Error, Result};
use crate::session::SessionFlag;
use crate::state::SyncState;

const STATUS_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Wifi,
    Cellular,
    Ethernet,
    Other,
}

/// Connectivity change reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEvent {
    pub connected: bool,
    pub transport: Transport,
}

impl NetworkEvent {
    pub fn connected(transport: Transport) -> Self {
        Self {
            connected: true,
            transport,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            connected: false,
            transport: Transport::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Success { changed: bool, at: DateTime<Utc> },
    /// The refresh was cancelled before it finished; nothing was recorded.
    Cancelled,
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    Disconnected,
    AutoSyncDisabled,
    NotWifi,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed { changed: bool },
    /// Another sync (or a download) was already running; nothing was done.
    InProgress,
    Cancelled,
    Failed { message: String },
    Ignored { reason: IgnoreReason },
}

pub struct SyncController {
    orchestrator: Arc<DownloadOrchestrator>,
    cache: Arc<ResourceCache>,
    status: broadcast::Sender<SyncStatus>,
    session: SessionFlag,
}

impl SyncController {
    pub fn new(orchestrator: Arc<DownloadOrchestrator>) -> Self {
        let cache = Arc::clone(orchestrator.cache());
        let (status, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            orchestrator,
            cache,
            status,
            session: SessionFlag::new(),
        }
    }

    /// Receive future status updates. Earlier updates are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.status.receiver_count()
    }

    pub fn is_syncing(&self) -> bool {
        self.session.is_active()
    }

    fn publish(&self, status: SyncStatus) {
        debug!(?status, "sync status");
        // No subscribers is fine.
        let _ = self.status.send(status);
    }

    pub async fn settings(&self) -> Result<SyncState> {
        self.cache.sync_state().await
    }

    pub async fn set_auto_sync(&self, enabled: bool) -> Result<SyncState> {
        info!(enabled, "auto-sync toggled");
        self.cache
            .update_sync_state(|state| state.auto_sync = enabled)
            .await
    }

    pub async fn set_wifi_only(&self, enabled: bool) -> Result<SyncState> {
        info!(enabled, "wifi-only sync toggled");
        self.cache
            .update_sync_state(|state| state.wifi_only = enabled)
            .await
    }

    /// React to a connectivity change according to the persisted policy.
    pub async fn on_network_change(&self, event: NetworkEvent) -> SyncOutcome {
        if !event.connected {
            return SyncOutcome::Ignored {
                reason: IgnoreReason::Disconnected,
            };
        }

        let state = match self.cache.sync_state().await {
            Ok(state) => state,
            Err(err) => {
                warn!(%err, "sync settings unreadable, using defaults");
                SyncState::default()
            }
        };

        if !state.auto_sync {
            debug!("auto-sync disabled, ignoring reconnect");
            return SyncOutcome::Ignored {
                reason: IgnoreReason::AutoSyncDisabled,
            };
        }
        if state.wifi_only && event.transport != Transport::Wifi {
            debug!(transport = ?event.transport, "wifi-only sync, ignoring reconnect");
            return SyncOutcome::Ignored {
                reason: IgnoreReason::NotWifi,
            };
        }

        info!(transport = ?event.transport, "network reconnected, syncing");
        self.check_for_updates().await
    }

    /// Refresh the cached dataset now.
    pub async fn check_for_updates(&self) -> SyncOutcome {
        let Some(_session) = self.session.try_begin() else {
            debug!("sync already in progress");
            return SyncOutcome::InProgress;
        };
        if self.orchestrator.is_active() {
            debug!("download in progress, skipping sync");
            return SyncOutcome::InProgress;
        }

        self.publish(SyncStatus::Syncing);
        let outcome = match self.orchestrator.download_metadata_only().await {
            Ok(result) if result.is_cancelled() => {
                info!("sync cancelled");
                self.publish(SyncStatus::Cancelled);
                SyncOutcome::Cancelled
            }
            Ok(result) => {
                let at = self.cache.clock().now();
                info!(changed = result.dataset_changed, "sync completed");
                self.publish(SyncStatus::Success {
                    changed: result.dataset_changed,
                    at,
                });
                SyncOutcome::Completed {
                    changed: result.dataset_changed,
                }
            }
            Err(Error::DownloadInProgress) => {
                self.publish(SyncStatus::Idle);
                return SyncOutcome::InProgress;
            }
            Err(err) => {
                let message = err.to_string();
                warn!(%message, "sync failed");
                self.publish(SyncStatus::Error {
                    message: message.clone(),
                });
                SyncOutcome::Failed { message }
            }
        };
        self.publish(SyncStatus::Idle);
        outcome
    }

    /// Consume platform network events in a background task until the
    /// sender side is dropped. Each event is handled on its own task so that
    /// events arriving mid-sync hit the in-progress guard.
    pub fn listen(self: Arc<Self>, mut events: mpsc::Receiver<NetworkEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let controller = Arc::clone(&self);
                tokio::spawn(async move {
                    let outcome = controller.on_network_change(event).await;
                    debug!(?event, ?outcome, "network event handled");
                });
            }
            debug!("network event stream closed");
        })
    }
}
