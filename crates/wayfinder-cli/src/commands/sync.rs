//! Sync and sync-settings command handlers.

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use wayfinder_lib::{SyncController, SyncOutcome};

use wayfinder_cli::output::{format_settings, format_sync, OutputFormat};

use super::{AppContext, GlobalOptions};

pub async fn handle_sync(options: &GlobalOptions, format: OutputFormat) -> Result<()> {
    let context = AppContext::open(options, true)?;
    let controller = SyncController::new(Arc::new(context.orchestrator()));

    let outcome = controller.check_for_updates().await;
    format.emit(&outcome, format_sync)?;
    if let SyncOutcome::Failed { message } = outcome {
        bail!("sync failed: {message}");
    }
    Ok(())
}

pub async fn handle_settings(
    options: &GlobalOptions,
    auto_sync: Option<bool>,
    wifi_only: Option<bool>,
    format: OutputFormat,
) -> Result<()> {
    let context = AppContext::open(options, false)?;
    let controller = SyncController::new(Arc::new(context.orchestrator()));

    if let Some(enabled) = auto_sync {
        controller
            .set_auto_sync(enabled)
            .await
            .context("failed to update auto-sync")?;
    }
    if let Some(enabled) = wifi_only {
        controller
            .set_wifi_only(enabled)
            .await
            .context("failed to update wifi-only")?;
    }

    let state = controller
        .settings()
        .await
        .context("failed to read sync settings")?;
    format.emit(&state, format_settings)
}
