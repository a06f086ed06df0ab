//! Wayfinder library entry points.
//!
//! This crate owns the indoor campus graph, the A* router with turn-by-turn
//! directions, the two-tier offline resource cache, download sessions, the
//! connectivity-driven sync controller and freshness evaluation. Platform
//! capabilities (key-value storage, blob storage, fetching, clock) are
//! injected as traits so the CLI and tests can supply their own.
//!

#![deny(warnings)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod directions;
pub mod download;
pub mod error;
pub mod fetch;
pub mod freshness;
pub mod graph;
pub mod ingest;
pub mod model;
pub mod path;
pub mod routing;
pub mod session;
pub mod state;
pub mod store;
pub mod sync;

pub use cache::{
    CacheConfig, CacheMetadata, ImageSource, OfflineStats, PrefetchReport, ResourceCache,
    VerificationReport,
};
pub use clock::{Clock, SystemClock};
pub use config::{default_data_dir, DatasetEndpoints, DatasetSource, WayfinderConfig};
pub use directions::{compass_to_direction, CompassDirection, Directions, Instruction, Movement};
pub use download::{
    CancelHandle, DownloadMode, DownloadOrchestrator, DownloadOutcome, DownloadPhase,
    DownloadProgress, DownloadStatus,
};
pub use error::{Error, Result};
pub use fetch::{Fetch, HttpFetcher, LocalFetcher, OfflineFetcher};
pub use freshness::{
    classify, estimate_download_size, format_bytes, has_storage_headroom, Severity, Staleness,
};
pub use graph::GraphModel;
pub use model::{Edge, EdgeId, MapPosition, Node, NodeId, NodeKind};
pub use path::{find_path, PathResult, PathStep, SearchOptions};
pub use routing::{Router, RouterConfig};
pub use state::SyncState;
pub use store::{
    AssetRef, BlobStore, FsBlobStore, KeyValueStore, MemoryBlobStore, MemoryStore, SqliteStore,
};
pub use sync::{NetworkEvent, SyncController, SyncOutcome, SyncStatus, Transport};
