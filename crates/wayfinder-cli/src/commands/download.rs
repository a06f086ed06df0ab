//! Download command handler for populating the offline cache.

use anyhow::{Context, Result};
use tracing::{info, warn};

use wayfinder_lib::DownloadPhase;

use wayfinder_cli::output::{format_download, OutputFormat};

use super::{AppContext, GlobalOptions};

/// Handle the download subcommand.
///
/// Ctrl-C cancels between items; images fetched so far stay cached.
pub async fn handle_download(
    options: &GlobalOptions,
    metadata_only: bool,
    format: OutputFormat,
) -> Result<()> {
    let context = AppContext::open(options, true)?;
    let orchestrator = context.orchestrator();

    let cancel = orchestrator.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling download");
            cancel.cancel();
        }
    });

    let mut progress = orchestrator.progress();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let update = progress.borrow_and_update().clone();
            if update.phase == DownloadPhase::Downloading && update.total > 0 {
                info!(
                    completed = update.completed,
                    total = update.total,
                    percentage = update.percentage.round() as u64,
                    item = update.current_item.as_deref().unwrap_or(""),
                    "downloading"
                );
            }
        }
    });

    let result = if metadata_only {
        orchestrator.download_metadata_only().await
    } else {
        orchestrator.download_all_resources().await
    };
    interrupt.abort();
    drop(orchestrator);
    let _ = reporter.await;

    let outcome = result.context("failed to download campus data")?;
    format.emit(&outcome, format_download)
}
