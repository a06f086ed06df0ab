mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wayfinder_cli::output::OutputFormat;

use commands::route::RouteArgs;
use commands::GlobalOptions;

#[derive(Parser, Debug)]
#[command(author, version, about = "Offline campus wayfinding utilities")]
struct Cli {
    /// Override the directory holding the offline cache.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Dataset source: an HTTP base URL or a local export directory.
    #[arg(long, global = true)]
    source: Option<String>,

    /// Output format for command results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log line format (logs go to stderr).
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the campus dataset (and images) for offline use.
    Download {
        /// Fetch nodes and edges only; images are cached later on demand.
        #[arg(long)]
        metadata_only: bool,
    },
    /// Compute directions between two node codes from the offline cache.
    Route {
        /// Starting node code.
        #[arg(long = "from")]
        from: String,
        /// Destination node code.
        #[arg(long = "to")]
        to: String,
        /// Never route over staircases.
        #[arg(long)]
        avoid_stairs: bool,
        /// Cache images of the nodes around the destination.
        #[arg(long)]
        prefetch: bool,
    },
    /// Summarize what is available offline.
    Stats,
    /// Check that the cached graph supports offline routing.
    Verify,
    /// Report how stale the offline data is and the full download size.
    Freshness {
        /// Free storage in bytes, to check download headroom.
        #[arg(long)]
        available_bytes: Option<u64>,
    },
    /// Refresh the cached dataset now.
    Sync,
    /// Show or change the sync policy.
    Settings {
        /// Sync automatically when the network reconnects.
        #[arg(long, value_parser = BoolishValueParser::new())]
        auto_sync: Option<bool>,
        /// Only auto-sync over WiFi.
        #[arg(long, value_parser = BoolishValueParser::new())]
        wifi_only: Option<bool>,
    },
    /// Remove all cached data and images (sync settings are kept).
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let options = GlobalOptions {
        data_dir: cli.data_dir,
        source: cli.source,
    };
    let format = cli.format;

    match cli.command {
        Command::Download { metadata_only } => {
            commands::download::handle_download(&options, metadata_only, format).await
        }
        Command::Route {
            from,
            to,
            avoid_stairs,
            prefetch,
        } => {
            let args = RouteArgs {
                from,
                to,
                avoid_stairs,
                prefetch,
            };
            commands::route::handle_route(&options, &args, format).await
        }
        Command::Stats => commands::stats::handle_stats(&options, format).await,
        Command::Verify => commands::stats::handle_verify(&options, format).await,
        Command::Freshness { available_bytes } => {
            commands::freshness::handle_freshness(&options, available_bytes, format).await
        }
        Command::Sync => commands::sync::handle_sync(&options, format).await,
        Command::Settings {
            auto_sync,
            wifi_only,
        } => commands::sync::handle_settings(&options, auto_sync, wifi_only, format).await,
        Command::Clear => commands::stats::handle_clear(&options).await,
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}
