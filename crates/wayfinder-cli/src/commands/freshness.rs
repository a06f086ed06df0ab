//! Freshness command handler.

use anyhow::{Context, Result};
use tracing::warn;

use wayfinder_lib::{classify, estimate_download_size, has_storage_headroom, Clock, SystemClock};

use wayfinder_cli::output::{format_freshness, FreshnessReport, OutputFormat};

use super::{AppContext, GlobalOptions};

pub async fn handle_freshness(
    options: &GlobalOptions,
    available_bytes: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    let context = AppContext::open(options, false)?;
    let state = context
        .cache
        .sync_state()
        .await
        .context("failed to read sync state")?;

    let node_count = match context.cache.get_nodes().await {
        Ok(nodes) => nodes.len(),
        Err(err) => {
            warn!(%err, "cached nodes unreadable");
            0
        }
    };

    let estimate = estimate_download_size(node_count);
    let report = FreshnessReport {
        staleness: classify(state.last_sync, SystemClock.now()),
        node_count,
        estimate,
        available_bytes,
        has_headroom: available_bytes
            .map(|available| has_storage_headroom(available, estimate.total_bytes)),
    };
    format.emit(&report, format_freshness)
}
