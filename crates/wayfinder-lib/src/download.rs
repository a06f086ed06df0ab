//! Download sessions that populate the offline cache.
//!
//! A session first fetches and persists the node and edge collections, then
//! (in full mode) walks every node with an image and caches it. Progress is
//! published on a `watch` channel after each item. Cancellation is
//! cooperative and checked between items.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::{node_image_key, ResourceCache};
use crate::config::DatasetEndpoints;
use crate::error::{Error, Result};
use crate::ingest::{parse_edges, parse_nodes};
use crate::model::NodeId;
use crate::routing::Router;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadPhase {
    Idle,
    Downloading,
    Completed,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadProgress {
    pub phase: DownloadPhase,
    pub total: usize,
    pub completed: usize,
    /// Completed share of `total`, 0–100.
    pub percentage: f64,
    pub current_item: Option<String>,
    pub message: Option<String>,
}

impl Default for DownloadProgress {
    fn default() -> Self {
        Self {
            phase: DownloadPhase::Idle,
            total: 0,
            completed: 0,
            percentage: 0.0,
            current_item: None,
            message: None,
        }
    }
}

impl DownloadProgress {
    fn at(phase: DownloadPhase, completed: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            100.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        Self {
            phase,
            total,
            completed,
            percentage,
            current_item: None,
            message: None,
        }
    }

    fn with_item(mut self, item: impl Into<String>) -> Self {
        self.current_item = Some(item.into());
        self
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadMode {
    Full,
    MetadataOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Completed,
    Cancelled,
}

/// An image that could not be cached during a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageFailure {
    pub node_id: NodeId,
    pub key: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadOutcome {
    pub mode: DownloadMode,
    pub status: DownloadStatus,
    pub node_count: usize,
    pub edge_count: usize,
    /// Whether the persisted dataset differs from what was cached before.
    pub dataset_changed: bool,
    pub images_succeeded: usize,
    pub images_failed: usize,
    /// Images that were already cached and not fetched again.
    pub images_skipped: usize,
    pub failures: Vec<ImageFailure>,
}

impl DownloadOutcome {
    pub fn is_cancelled(&self) -> bool {
        self.status == DownloadStatus::Cancelled
    }
}

/// Cloneable cancellation flag for a running session.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}

pub type ProgressCallback = Box<dyn Fn(&DownloadProgress) + Send + Sync>;

pub struct DownloadOrchestrator {
    cache: Arc<ResourceCache>,
    router: Arc<Router>,
    endpoints: DatasetEndpoints,
    cancel: CancelHandle,
    progress: watch::Sender<DownloadProgress>,
    callback: Option<ProgressCallback>,
}

impl DownloadOrchestrator {
    pub fn new(cache: Arc<ResourceCache>, router: Arc<Router>, endpoints: DatasetEndpoints) -> Self {
        let (progress, _) = watch::channel(DownloadProgress::default());
        Self {
            cache,
            router,
            endpoints,
            cancel: CancelHandle::default(),
            progress,
            callback: None,
        }
    }

    /// Also report every progress update to `callback`.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DownloadProgress) + Send + Sync + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn progress(&self) -> watch::Receiver<DownloadProgress> {
        self.progress.subscribe()
    }

    /// Handle that cancels the running session. A session clears the flag
    /// when it starts.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_active(&self) -> bool {
        self.cache.download_activity().is_active()
    }

    pub async fn download_all_resources(&self) -> Result<DownloadOutcome> {
        self.run(DownloadMode::Full).await
    }

    pub async fn download_metadata_only(&self) -> Result<DownloadOutcome> {
        self.run(DownloadMode::MetadataOnly).await
    }

    fn publish(&self, progress: DownloadProgress) {
        if let Some(callback) = &self.callback {
            callback(&progress);
        }
        self.progress.send_replace(progress);
    }

    async fn run(&self, mode: DownloadMode) -> Result<DownloadOutcome> {
        let _session = self
            .cache
            .download_activity()
            .try_begin()
            .ok_or(Error::DownloadInProgress)?;
        self.cancel.reset();
        info!(?mode, "download session started");

        match self.run_session(mode).await {
            Ok(outcome) => {
                let phase = match outcome.status {
                    DownloadStatus::Completed => DownloadPhase::Completed,
                    DownloadStatus::Cancelled => DownloadPhase::Cancelled,
                };
                let done = outcome.images_succeeded + outcome.images_failed + outcome.images_skipped;
                let total = match mode {
                    DownloadMode::Full => self.progress.borrow().total.max(done),
                    DownloadMode::MetadataOnly => 0,
                };
                self.publish(DownloadProgress::at(phase, done, total));
                info!(
                    ?mode,
                    status = ?outcome.status,
                    nodes = outcome.node_count,
                    edges = outcome.edge_count,
                    images = outcome.images_succeeded,
                    failed = outcome.images_failed,
                    "download session finished"
                );
                Ok(outcome)
            }
            Err(err) => {
                warn!(?mode, %err, "download session failed");
                let current = self.progress.borrow().clone();
                self.publish(
                    DownloadProgress::at(DownloadPhase::Error, current.completed, current.total)
                        .with_message(err.to_string()),
                );
                Err(err)
            }
        }
    }

    async fn run_session(&self, mode: DownloadMode) -> Result<DownloadOutcome> {
        self.publish(
            DownloadProgress::at(DownloadPhase::Downloading, 0, 0)
                .with_message("fetching campus dataset"),
        );

        let (node_count, edge_count, dataset_changed) = self.refresh_dataset().await?;
        let mut outcome = DownloadOutcome {
            mode,
            status: DownloadStatus::Completed,
            node_count,
            edge_count,
            dataset_changed,
            images_succeeded: 0,
            images_failed: 0,
            images_skipped: 0,
            failures: Vec::new(),
        };

        if self.cancel.is_cancelled() {
            outcome.status = DownloadStatus::Cancelled;
            return Ok(outcome);
        }

        if mode == DownloadMode::Full {
            self.download_images(&mut outcome).await?;
        }

        // A completed session that cannot record its sync time is a failure;
        // otherwise freshness would keep reporting stale data.
        if outcome.status == DownloadStatus::Completed {
            self.cache.record_sync().await?;
        }
        Ok(outcome)
    }

    /// Fetch both collections, persist them and invalidate the router when
    /// the dataset changed.
    async fn refresh_dataset(&self) -> Result<(usize, usize, bool)> {
        let fetcher = self.cache.fetcher();
        let nodes = fetcher
            .get_json(&self.endpoints.nodes)
            .await
            .and_then(parse_nodes)
            .map_err(|err| dataset_failure("nodes", err))?;
        let edges = fetcher
            .get_json(&self.endpoints.edges)
            .await
            .and_then(parse_edges)
            .map_err(|err| dataset_failure("edges", err))?;

        let (node_count, edge_count) = (nodes.len(), edges.len());
        debug!(nodes = node_count, edges = edge_count, "dataset fetched");

        let changed = self
            .cache
            .replace_dataset(nodes, edges)
            .await
            .map_err(|err| dataset_failure("dataset", err))?;
        if changed {
            self.router.invalidate();
        }
        Ok((node_count, edge_count, changed))
    }

    async fn download_images(&self, outcome: &mut DownloadOutcome) -> Result<()> {
        let nodes = self.cache.get_nodes().await?;
        let with_images: Vec<_> = nodes.iter().filter(|node| node.has_image()).collect();
        let total = with_images.len();
        let mut completed = 0;
        self.publish(DownloadProgress::at(DownloadPhase::Downloading, 0, total));

        for node in with_images {
            if self.cancel.is_cancelled() {
                info!(completed, total, "download cancelled");
                outcome.status = DownloadStatus::Cancelled;
                return Ok(());
            }

            self.publish(
                DownloadProgress::at(DownloadPhase::Downloading, completed, total)
                    .with_item(node.name.clone()),
            );

            if self.cache.is_image_cached(node.id).await {
                outcome.images_skipped += 1;
            } else {
                match self.cache.download_node_image(node).await {
                    Ok(_) => outcome.images_succeeded += 1,
                    Err(err) => {
                        let key = node_image_key(node.id);
                        let failure = Error::PartialImageFailure {
                            key: key.clone(),
                            message: err.to_string(),
                        };
                        warn!(node = node.id, %failure, "image download failed");
                        outcome.images_failed += 1;
                        outcome.failures.push(ImageFailure {
                            node_id: node.id,
                            key,
                            message: err.to_string(),
                        });
                    }
                }
            }

            completed += 1;
            self.publish(
                DownloadProgress::at(DownloadPhase::Downloading, completed, total)
                    .with_item(node.name.clone()),
            );
        }
        Ok(())
    }
}

fn dataset_failure(what: &str, err: Error) -> Error {
    match err {
        Error::DownloadFailed { .. } => err,
        other => Error::DownloadFailed {
            message: format!("{what}: {other}"),
        },
    }
}
