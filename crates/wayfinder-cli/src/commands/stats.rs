//! Cache inspection commands: `stats`, `verify` and `clear`.

use anyhow::{bail, Context, Result};

use wayfinder_cli::output::{format_stats, format_verification, OutputFormat};

use super::{AppContext, GlobalOptions};

pub async fn handle_stats(options: &GlobalOptions, format: OutputFormat) -> Result<()> {
    let context = AppContext::open(options, false)?;
    let stats = context
        .cache
        .offline_stats()
        .await
        .context("failed to inspect the offline cache")?;
    format.emit(&stats, format_stats)
}

pub async fn handle_verify(options: &GlobalOptions, format: OutputFormat) -> Result<()> {
    let context = AppContext::open(options, false)?;
    let report = context
        .cache
        .verify_pathfinding()
        .await
        .context("failed to read the offline cache")?;
    format.emit(&report, format_verification)?;

    if !report.passed {
        bail!("offline pathfinding verification failed: {}", report.message);
    }
    Ok(())
}

pub async fn handle_clear(options: &GlobalOptions) -> Result<()> {
    let context = AppContext::open(options, false)?;
    context
        .cache
        .clear()
        .await
        .context("failed to clear the offline cache")?;
    context.router.invalidate();
    println!("Offline cache cleared");
    Ok(())
}
