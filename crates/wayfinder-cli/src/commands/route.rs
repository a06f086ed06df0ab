//! Route command handler.

use anyhow::{Context, Result};
use tracing::debug;

use wayfinder_cli::output::{format_directions, OutputFormat};

use super::{AppContext, GlobalOptions};

/// Arguments for the `route` subcommand.
#[derive(Debug, Clone)]
pub struct RouteArgs {
    pub from: String,
    pub to: String,
    pub avoid_stairs: bool,
    /// Cache the images around the destination after routing.
    pub prefetch: bool,
}

pub async fn handle_route(options: &GlobalOptions, args: &RouteArgs, format: OutputFormat) -> Result<()> {
    let context = AppContext::open(options, false)?;
    context
        .router
        .ensure_loaded(&context.cache)
        .await
        .context("failed to load the campus graph from the offline cache")?;

    let directions = context
        .router
        .get_directions(&args.from, &args.to, args.avoid_stairs)?;

    if args.prefetch {
        if let Some(goal) = directions.path.steps.last() {
            let report = context
                .cache
                .predictive_cache(&context.router, goal.node.id)
                .await;
            debug!(
                fetched = report.fetched,
                failed = report.failed,
                "prefetched images around destination"
            );
        }
    }

    format.emit(&directions, format_directions)
}
