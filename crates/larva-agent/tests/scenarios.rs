//! End-to-end scenarios for the agent loops.
//!
//! Each test drives single ticks of the engines against a file-backed store,
//! the mock camera, the mock sensor and the mock uplink.

use std::sync::Arc;

use tempfile::TempDir;

use larva_agent::config::CrateConfig;
use larva_agent::{CapturePipeline, CleanupEngine, HeartbeatTask, SyncEngine};
use larva_core::{ImageFailure, MockCamera, MockSensor, MockUplink, sha256_hex};
use larva_store::Store;

struct Fixture {
    dir: TempDir,
    store: Arc<Store>,
    uplink: Arc<MockUplink>,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(dir.path().join("edge.db")).unwrap());
        register_crate(&store);
        Self {
            dir,
            store,
            uplink: Arc::new(MockUplink::new()),
        }
    }

    fn reopen(&mut self) {
        self.store = Arc::new(Store::open(self.dir.path().join("edge.db")).unwrap());
    }

    fn pipeline(&self, burst_size: u32) -> CapturePipeline {
        CapturePipeline::new(
            Arc::clone(&self.store),
            Arc::new(MockCamera::new(24, 16)),
            1,
            self.dir.path().join("images"),
        )
        .unwrap()
        .burst_size(burst_size)
    }

    fn sync(&self) -> SyncEngine {
        SyncEngine::new(Arc::clone(&self.store), self.uplink.clone(), "device-001")
    }
}

fn register_crate(store: &Store) {
    let record = CrateConfig {
        id: Some(1),
        label: "A".to_string(),
        started_at: Some("2025-01-01".to_string()),
        ..Default::default()
    }
    .to_stored()
    .unwrap();
    assert_eq!(store.upsert_crate(&record).unwrap(), 1);
}

#[tokio::test]
async fn test_burst_of_two_for_crate_one() {
    let fx = Fixture::new();
    let mut pipeline = fx.pipeline(2);

    let outcome = pipeline.capture_once().await.unwrap();
    assert_eq!(outcome.event_id, 1);

    let event = fx.store.get_event(1).unwrap().unwrap();
    assert_eq!(event.crate_id, 1);
    assert_eq!(event.burst_size, 2);

    let images = fx.store.get_images_for_event(1).unwrap();
    let indices: Vec<u32> = images.iter().map(|i| i.image_index).collect();
    assert_eq!(indices, vec![0, 1]);
}

#[tokio::test]
async fn test_event_ids_keep_increasing_across_restart() {
    let mut fx = Fixture::new();
    {
        let mut pipeline = fx.pipeline(1);
        pipeline.capture_once().await.unwrap();
        pipeline.capture_once().await.unwrap();
    }

    fx.reopen();
    let mut pipeline = fx.pipeline(1);
    let outcome = pipeline.capture_once().await.unwrap();
    assert_eq!(outcome.event_id, 3);
}

#[tokio::test]
async fn test_stored_checksum_matches_file_on_disk() {
    let fx = Fixture::new();
    fx.pipeline(3).capture_once().await.unwrap();

    for image in fx.store.get_images_for_event(1).unwrap() {
        let bytes = std::fs::read(&image.local_path).unwrap();
        assert_eq!(image.size_bytes, bytes.len() as u64);
        assert_eq!(image.checksum_hex, sha256_hex(&bytes));
    }
}

#[tokio::test]
async fn test_metadata_batch_of_five_is_all_or_nothing() {
    let fx = Fixture::new();
    let mut pipeline = fx.pipeline(1);
    for _ in 0..5 {
        pipeline.capture_once().await.unwrap();
    }
    let sync = fx.sync();

    fx.uplink.set_metadata_fails(true);
    assert!(sync.sync_event_metadata().await.is_err());
    for id in 1..=5 {
        assert!(!fx.store.get_event(id).unwrap().unwrap().uploaded);
        assert!(!fx.store.get_images_for_event(id).unwrap()[0].metadata_uploaded);
    }

    fx.uplink.set_metadata_fails(false);
    assert_eq!(sync.sync_event_metadata().await.unwrap(), 5);
    for id in 1..=5 {
        assert!(fx.store.get_event(id).unwrap().unwrap().uploaded);
        assert!(fx.store.get_images_for_event(id).unwrap()[0].metadata_uploaded);
    }
}

#[tokio::test]
async fn test_failed_image_upload_is_never_retried() {
    let fx = Fixture::new();
    let mut pipeline = fx.pipeline(1);
    for _ in 0..3 {
        pipeline.capture_once().await.unwrap();
    }
    let sync = fx.sync();
    sync.sync_event_metadata().await.unwrap();

    // Events 1 and 2 already went up; only event 3 is left to try
    let target = fx.store.get_images_for_event(3).unwrap()[0].clone();
    fx.store.mark_image_uploaded(fx.store.get_images_for_event(1).unwrap()[0].id).unwrap();
    fx.store.mark_image_uploaded(fx.store.get_images_for_event(2).unwrap()[0].id).unwrap();

    fx.uplink.set_image_failure(Some(ImageFailure::Transport)).await;
    assert_eq!(sync.sync_image_binaries().await.unwrap(), (0, 1));

    let image = fx.store.get_image(target.id).unwrap().unwrap();
    assert!(image.corrupted);
    assert!(!image.uploaded);

    fx.uplink.set_image_failure(None).await;
    fx.uplink.clear_calls().await;
    assert_eq!(sync.sync_image_binaries().await.unwrap(), (0, 0));
    assert!(fx.uplink.image_attempts().await.is_empty());
}

#[tokio::test]
async fn test_watermark_bounds_cleanup() {
    let fx = Fixture::new();
    let mut pipeline = fx.pipeline(1);
    for _ in 0..7 {
        pipeline.capture_once().await.unwrap();
    }

    fx.uplink.set_watermark(Some(5));
    let heartbeat = HeartbeatTask::new(Arc::clone(&fx.store), fx.uplink.clone());
    assert_eq!(heartbeat.beat().await.unwrap(), Some(5));

    let report = CleanupEngine::new(Arc::clone(&fx.store), 0)
        .cleanup_once()
        .await
        .unwrap();
    assert_eq!(report.deleted, 5);

    for id in 1..=7 {
        let image = &fx.store.get_images_for_event(id).unwrap()[0];
        assert_eq!(image.local_exists, id > 5, "event {}", id);
        assert_eq!(image.local_path.exists(), id > 5, "event {}", id);
    }
}

#[tokio::test]
async fn test_no_watermark_means_no_deletions() {
    let fx = Fixture::new();
    fx.pipeline(2).capture_once().await.unwrap();

    // Heartbeat without a watermark
    HeartbeatTask::new(Arc::clone(&fx.store), fx.uplink.clone())
        .beat()
        .await
        .unwrap();

    let report = CleanupEngine::new(Arc::clone(&fx.store), 0)
        .cleanup_once()
        .await
        .unwrap();
    assert!(!report.ran);
    assert_eq!(report.deleted, 0);
    assert!(
        fx.store
            .get_images_for_event(1)
            .unwrap()
            .iter()
            .all(|i| i.local_exists && i.local_path.exists())
    );
}

#[tokio::test]
async fn test_full_cycle_with_sensor() {
    let fx = Fixture::new();
    let mut pipeline = fx.pipeline(2).with_sensor(Arc::new(MockSensor::new()));
    pipeline.capture_once().await.unwrap();

    let sync = fx.sync();
    let (report, errors) = sync.sync_once().await;
    assert!(errors.is_empty());
    assert_eq!(report.events_synced, 1);
    assert_eq!(report.readings_synced, 1);
    assert_eq!(report.images_uploaded, 2);

    let stats = fx.store.stats().unwrap();
    assert_eq!(stats.events_pending, 0);
    assert_eq!(stats.readings_pending, 0);
    assert_eq!(stats.images_uploaded, 2);
    assert_eq!(stats.images_corrupted, 0);

    let readings = fx.uplink.reading_batches().await;
    assert_eq!(readings[0][0].device_id, "device-001");
    assert_eq!(readings[0][0].reading_local_id, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sync_running_alongside_capture_strands_no_images() {
    let fx = Fixture::new();
    let mut pipeline = fx.pipeline(3);
    let sync = fx.sync();

    let capture = tokio::spawn(async move {
        for _ in 0..20 {
            pipeline.capture_once().await.unwrap();
            tokio::task::yield_now().await;
        }
    });
    let syncing = tokio::spawn(async move {
        for _ in 0..40 {
            sync.sync_event_metadata().await.unwrap();
            tokio::task::yield_now().await;
        }
        sync
    });

    capture.await.unwrap();
    let sync = syncing.await.unwrap();
    while sync.sync_event_metadata().await.unwrap() > 0 {}

    for id in 1..=20 {
        assert!(fx.store.get_event(id).unwrap().unwrap().uploaded, "event {}", id);
        let images = fx.store.get_images_for_event(id).unwrap();
        assert_eq!(images.len(), 3, "event {}", id);
        assert!(images.iter().all(|i| i.metadata_uploaded), "event {}", id);
    }
    assert_eq!(fx.store.stats().unwrap().images_metadata_pending, 0);
    assert_eq!(fx.store.get_unsynced_images(100).unwrap().len(), 60);
}
