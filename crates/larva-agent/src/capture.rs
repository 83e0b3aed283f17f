//! Capture pipeline: one burst of images (and optionally one sensor reading)
//! per tick.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use larva_core::{CameraBackend, SensorBackend};
use larva_store::{EntityKind, NewEvent, NewImage, NewReading, Store};

use crate::error::{Error, Result};
use crate::ids::IdAllocator;
use crate::worker::PeriodicTask;

/// Default camera name recorded on each event.
pub const DEFAULT_CAMERA_NAME: &str = "camera_0";

/// Result of one successful capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub event_id: i64,
    /// Number of images stored for the event.
    pub images: u32,
    /// Reading stored alongside the event, if a sensor is attached.
    pub reading_id: Option<i64>,
}

/// Produces capture events for a single crate.
///
/// This is the only owner of the event and reading counters; both are seeded
/// from the store once, at construction.
pub struct CapturePipeline {
    store: Arc<Store>,
    camera: Arc<dyn CameraBackend>,
    sensor: Option<Arc<dyn SensorBackend>>,
    crate_id: i64,
    camera_name: String,
    burst_size: u32,
    image_dir: PathBuf,
    events: IdAllocator,
    readings: IdAllocator,
}

impl CapturePipeline {
    /// Create a pipeline writing images under `image_dir`.
    pub fn new(
        store: Arc<Store>,
        camera: Arc<dyn CameraBackend>,
        crate_id: i64,
        image_dir: impl Into<PathBuf>,
    ) -> larva_store::Result<Self> {
        let events = IdAllocator::seeded(&store, EntityKind::Event)?;
        let readings = IdAllocator::seeded(&store, EntityKind::Reading)?;
        debug!(
            last_event_id = events.last(),
            last_reading_id = readings.last(),
            "Seeded capture counters"
        );

        Ok(Self {
            store,
            camera,
            sensor: None,
            crate_id,
            camera_name: DEFAULT_CAMERA_NAME.to_string(),
            burst_size: 10,
            image_dir: image_dir.into(),
            events,
            readings,
        })
    }

    /// Take a sensor reading with every capture.
    pub fn with_sensor(mut self, sensor: Arc<dyn SensorBackend>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    /// Number of images requested per burst.
    pub fn burst_size(mut self, burst_size: u32) -> Self {
        self.burst_size = burst_size;
        self
    }

    pub fn camera_name(mut self, name: impl Into<String>) -> Self {
        self.camera_name = name.into();
        self
    }

    /// The last event id handed out.
    pub fn last_event_id(&self) -> i64 {
        self.events.last()
    }

    /// Run one capture.
    ///
    /// Identifiers are consumed before any producer runs, so a failed
    /// capture leaves a gap that is never reused.
    pub async fn capture_once(&mut self) -> Result<CaptureOutcome> {
        let event_id = self.events.next_id();
        let captured_at = OffsetDateTime::now_utc();

        let reading_id = match &self.sensor {
            Some(sensor) => {
                let reading_id = self.readings.next_id();
                let sample = sensor
                    .read(self.crate_id, reading_id)
                    .await
                    .map_err(Error::Sensor)?;
                self.store
                    .insert_sensor_reading(&NewReading::from_sample(reading_id, self.crate_id, &sample))?;
                debug!(
                    reading_id,
                    temperature_c = ?sample.temperature_c,
                    humidity_pct = ?sample.humidity_pct,
                    "Stored sensor reading"
                );
                Some(reading_id)
            }
            None => None,
        };

        let artifacts = self
            .camera
            .capture_burst(event_id, &self.image_dir, self.burst_size)
            .await
            .map_err(Error::Camera)?;

        let images = artifacts.len() as u32;
        let event = NewEvent {
            event_id,
            crate_id: self.crate_id,
            camera_name: self.camera_name.clone(),
            captured_at,
            burst_size: images,
        };
        let rows: Vec<NewImage> = artifacts
            .iter()
            .map(|artifact| NewImage::from_artifact(event_id, artifact))
            .collect();

        // Files without rows would never be uploaded or cleaned up
        if let Err(e) = self.store.insert_capture(&event, &rows) {
            for artifact in &artifacts {
                if let Err(remove_err) = tokio::fs::remove_file(&artifact.path).await {
                    warn!(
                        event_id,
                        path = %artifact.path.display(),
                        "Failed to remove unrecorded image: {}", remove_err
                    );
                }
            }
            return Err(e.into());
        }

        if images < self.burst_size {
            info!(
                event_id,
                "Captured {} of {} requested images", images, self.burst_size
            );
        } else {
            info!(event_id, "Captured {} images", images);
        }

        Ok(CaptureOutcome {
            event_id,
            images,
            reading_id,
        })
    }
}

#[async_trait]
impl PeriodicTask for CapturePipeline {
    fn name(&self) -> &'static str {
        "capture"
    }

    async fn tick(&mut self) -> Result<()> {
        self.capture_once().await.map(|_| ())
    }
}
