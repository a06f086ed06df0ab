mod common;

use std::sync::{Arc, Mutex};

use common::{
    diamond, edge, image_url, node, node_with_image, CountingStore, Harness, ScriptedFetcher,
};
use wayfinder_lib::state::SYNC_STATE_KEY;
use wayfinder_lib::{
    DatasetEndpoints, DownloadMode, DownloadOrchestrator, DownloadPhase, DownloadStatus, Edge,
    Error, Node,
};

fn campus() -> (Vec<Node>, Vec<Edge>) {
    let nodes = vec![
        node_with_image(1, "ENT", 0),
        node_with_image(2, "HALL-1", 0),
        node(3, "JUNCTION", 0),
        node_with_image(4, "LAB-101", 1),
        node_with_image(5, "LIB", 0),
    ];
    let edges = vec![
        edge(1, 1, 2, 12.0),
        edge(2, 2, 3, 8.0),
        edge(3, 3, 4, 15.0),
        edge(4, 3, 5, 9.0),
    ];
    (nodes, edges)
}

#[tokio::test]
async fn metadata_download_enables_offline_routing() {
    let (nodes, edges) = campus();
    let harness = Harness::new(ScriptedFetcher::with_dataset(&nodes, &edges));
    assert!(!harness.cache.is_pathfinding_available().await);

    let outcome = harness
        .orchestrator
        .download_metadata_only()
        .await
        .expect("metadata download");

    assert_eq!(outcome.mode, DownloadMode::MetadataOnly);
    assert_eq!(outcome.status, DownloadStatus::Completed);
    assert_eq!(outcome.node_count, 5);
    assert_eq!(outcome.edge_count, 4);
    assert!(outcome.dataset_changed);
    assert_eq!(harness.fetcher.image_fetches(), 0);
    assert!(harness.cache.is_pathfinding_available().await);

    harness
        .router
        .ensure_loaded(&harness.cache)
        .await
        .expect("graph from cache");
    let path = harness.router.find_path("ENT", "LAB-101", false).expect("route");
    assert_eq!(path.total_distance, 35.0);

    let state = harness.cache.sync_state().await.expect("state");
    assert!(state.last_sync.is_some());
}

#[tokio::test]
async fn full_download_caches_every_image_and_reports_progress() {
    let (nodes, edges) = campus();
    let harness = Harness::new(ScriptedFetcher::with_dataset(&nodes, &edges));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let orchestrator = DownloadOrchestrator::new(
        Arc::clone(&harness.cache),
        Arc::clone(&harness.router),
        DatasetEndpoints::default(),
    )
    .with_progress_callback(move |progress| {
        sink.lock()
            .expect("sink lock")
            .push((progress.phase, progress.current_item.clone()));
    });
    let progress = orchestrator.progress();

    let outcome = orchestrator.download_all_resources().await.expect("download");
    assert_eq!(outcome.status, DownloadStatus::Completed);
    assert_eq!(outcome.images_succeeded, 4);
    assert_eq!(outcome.images_failed, 0);
    for id in [1, 2, 4, 5] {
        assert!(harness.cache.is_image_cached(id).await, "image {id}");
    }

    let last = progress.borrow().clone();
    assert_eq!(last.phase, DownloadPhase::Completed);
    assert_eq!(last.completed, 4);
    assert_eq!(last.percentage, 100.0);

    let seen = seen.lock().expect("seen lock");
    assert!(seen
        .iter()
        .any(|(phase, item)| *phase == DownloadPhase::Downloading
            && item.as_deref() == Some("LAB-101 name")));
    assert_eq!(seen.last().map(|(phase, _)| *phase), Some(DownloadPhase::Completed));
}

#[tokio::test]
async fn cancelling_keeps_completed_images() {
    let (nodes, edges) = campus();
    let harness = Harness::new(ScriptedFetcher::with_dataset(&nodes, &edges));
    harness
        .fetcher
        .cancel_after(harness.orchestrator.cancel_handle(), 2);

    let outcome = harness
        .orchestrator
        .download_all_resources()
        .await
        .expect("cancelled, not failed");

    assert!(outcome.is_cancelled());
    assert_eq!(outcome.images_succeeded, 2);
    assert_eq!(harness.fetcher.image_fetches(), 2);
    assert!(harness.cache.is_image_cached(1).await);
    assert!(harness.cache.is_image_cached(2).await);
    assert!(!harness.cache.is_image_cached(4).await);
    assert_eq!(harness.orchestrator.progress().borrow().phase, DownloadPhase::Cancelled);
    assert!(harness.cache.sync_state().await.expect("state").last_sync.is_none());
    assert!(harness.cache.is_pathfinding_available().await);
}

#[tokio::test]
async fn single_image_failure_is_recorded_and_skipped() {
    let (nodes, edges) = campus();
    let fetcher = ScriptedFetcher::with_dataset(&nodes, &edges);
    fetcher.fail(&image_url(2));
    let harness = Harness::new(fetcher);

    let outcome = harness
        .orchestrator
        .download_all_resources()
        .await
        .expect("download completes");

    assert_eq!(outcome.status, DownloadStatus::Completed);
    assert_eq!(outcome.images_succeeded, 3);
    assert_eq!(outcome.images_failed, 1);
    assert_eq!(outcome.failures[0].node_id, 2);
    assert_eq!(outcome.failures[0].key, "node-image-2");
    assert!(!harness.cache.is_image_cached(2).await);
    assert!(harness.cache.is_image_cached(5).await);
}

#[tokio::test]
async fn dataset_failure_fails_the_session() {
    let (nodes, edges) = campus();
    let fetcher = ScriptedFetcher::with_dataset(&nodes, &edges);
    fetcher.fail(&DatasetEndpoints::default().edges);
    let harness = Harness::new(fetcher);

    let error = harness
        .orchestrator
        .download_all_resources()
        .await
        .expect_err("edges unavailable");
    assert!(matches!(error, Error::DownloadFailed { .. }));

    let progress = harness.orchestrator.progress().borrow().clone();
    assert_eq!(progress.phase, DownloadPhase::Error);
    assert!(progress.message.is_some());
    assert_eq!(harness.fetcher.image_fetches(), 0);
    assert!(!harness.cache.is_pathfinding_available().await);
}

#[tokio::test]
async fn only_one_session_at_a_time() {
    let (nodes, edges) = campus();
    let harness = Harness::new(ScriptedFetcher::with_dataset(&nodes, &edges));

    let _active = harness
        .cache
        .download_activity()
        .try_begin()
        .expect("free");
    let error = harness
        .orchestrator
        .download_metadata_only()
        .await
        .expect_err("busy");
    assert!(matches!(error, Error::DownloadInProgress));
}

#[tokio::test]
async fn repeat_download_skips_cached_images() {
    let (nodes, edges) = campus();
    let harness = Harness::new(ScriptedFetcher::with_dataset(&nodes, &edges));

    harness
        .orchestrator
        .download_all_resources()
        .await
        .expect("first");
    let outcome = harness
        .orchestrator
        .download_all_resources()
        .await
        .expect("second");

    assert!(!outcome.dataset_changed);
    assert_eq!(outcome.images_skipped, 4);
    assert_eq!(outcome.images_succeeded, 0);
    assert_eq!(harness.fetcher.image_fetches(), 4);
}

#[tokio::test]
async fn changed_dataset_invalidates_the_router() {
    let (nodes, edges) = diamond();
    let harness = Harness::new(ScriptedFetcher::with_dataset(&nodes, &edges));

    harness.orchestrator.download_metadata_only().await.expect("first");
    harness
        .router
        .ensure_loaded(&harness.cache)
        .await
        .expect("loaded");

    harness.orchestrator.download_metadata_only().await.expect("unchanged");
    assert!(harness.router.is_loaded(), "unchanged data keeps the graph");

    let mut closed = edges.clone();
    closed[2].is_active = false;
    harness.fetcher.set_dataset(&nodes, &closed);
    let outcome = harness
        .orchestrator
        .download_metadata_only()
        .await
        .expect("changed");
    assert!(outcome.dataset_changed);
    assert!(!harness.router.is_loaded());

    harness
        .router
        .ensure_loaded(&harness.cache)
        .await
        .expect("reloaded");
    let path = harness.router.find_path("A", "D", false).expect("route");
    assert_eq!(path.total_distance, 12.0);
}

#[tokio::test]
async fn failing_sync_bookkeeping_fails_the_session() {
    let (nodes, edges) = campus();
    let harness = Harness::with_store(
        CountingStore::failing_key(SYNC_STATE_KEY),
        ScriptedFetcher::with_dataset(&nodes, &edges),
    );
    let progress = harness.orchestrator.progress();

    let error = harness
        .orchestrator
        .download_metadata_only()
        .await
        .expect_err("sync time cannot be stored");
    assert!(matches!(error, Error::StorageWrite { ref key, .. } if key == SYNC_STATE_KEY));
    assert_eq!(progress.borrow().phase, DownloadPhase::Error);
    assert!(!harness.orchestrator.is_active());
}
