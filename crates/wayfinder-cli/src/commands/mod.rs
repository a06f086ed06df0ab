// Module exports for CLI subcommands.
//
// Each module handles one subcommand. main.rs parses arguments, opens the
// shared `AppContext` and dispatches here.

pub mod download;
pub mod freshness;
pub mod route;
pub mod stats;
pub mod sync;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use wayfinder_lib::{
    BlobStore, Clock, DownloadOrchestrator, Fetch, FsBlobStore, KeyValueStore, OfflineFetcher,
    ResourceCache, Router, SqliteStore, SystemClock, WayfinderConfig,
};

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub data_dir: Option<PathBuf>,
    pub source: Option<String>,
}

/// Wired core services for one CLI invocation.
pub struct AppContext {
    pub config: WayfinderConfig,
    pub cache: Arc<ResourceCache>,
    pub router: Arc<Router>,
}

impl AppContext {
    /// Resolve configuration and open the stores under the data directory.
    ///
    /// Commands that never touch the network can run without a configured
    /// dataset source; `require_source` makes a missing one an error.
    pub fn open(options: &GlobalOptions, require_source: bool) -> Result<Self> {
        let mut config = WayfinderConfig::load(options.data_dir.as_deref())
            .context("failed to resolve wayfinder configuration")?;
        if let Some(source) = &options.source {
            config.source = Some(source.clone());
        }

        let database = config.database_path()?;
        let kv = SqliteStore::open(&database)
            .with_context(|| format!("failed to open cache database {}", database.display()))?;
        let blobs = FsBlobStore::new(config.assets_dir()?);

        let fetch: Arc<dyn Fetch> = match config.build_fetcher() {
            Ok(fetch) => fetch,
            Err(err) if !require_source => {
                debug!(%err, "no dataset source, running offline");
                Arc::new(OfflineFetcher)
            }
            Err(err) => return Err(err).context("cannot reach the campus dataset"),
        };

        let cache = Arc::new(ResourceCache::new(
            Arc::new(kv) as Arc<dyn KeyValueStore>,
            Arc::new(blobs) as Arc<dyn BlobStore>,
            fetch,
            Arc::new(SystemClock) as Arc<dyn Clock>,
            config.cache.clone(),
        ));
        let router = Arc::new(Router::new(config.router));

        Ok(Self {
            config,
            cache,
            router,
        })
    }

    pub fn orchestrator(&self) -> DownloadOrchestrator {
        DownloadOrchestrator::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.router),
            self.config.endpoints.clone(),
        )
    }
}
