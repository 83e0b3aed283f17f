//! Sync engine: pushes event metadata, reading metadata and image payloads
//! to the server.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use larva_core::Uplink;
use larva_store::{Store, StoredImage};

use crate::error::{Error, Result};
use crate::worker::PeriodicTask;

/// Events per metadata upload.
pub const EVENT_BATCH_SIZE: u32 = 5;
/// Readings per metadata upload.
pub const READING_BATCH_SIZE: u32 = 10;
/// Image payloads per tick.
pub const IMAGE_BATCH_SIZE: u32 = 3;

/// Counts from one sync tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub events_synced: usize,
    pub readings_synced: usize,
    pub images_uploaded: usize,
    pub images_corrupted: usize,
}

impl SyncReport {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Moves unsynced rows to the server in small fixed batches.
///
/// The three steps are independent: a failure in one does not prevent the
/// others from running in the same tick.
pub struct SyncEngine {
    store: Arc<Store>,
    uplink: Arc<dyn Uplink>,
    device_id: String,
}

impl SyncEngine {
    pub fn new(store: Arc<Store>, uplink: Arc<dyn Uplink>, device_id: impl Into<String>) -> Self {
        Self {
            store,
            uplink,
            device_id: device_id.into(),
        }
    }

    /// Run every step once.
    ///
    /// Returns the report together with the errors of any steps that failed.
    pub async fn sync_once(&self) -> (SyncReport, Vec<Error>) {
        let mut report = SyncReport::default();
        let mut errors = Vec::new();

        match self.sync_event_metadata().await {
            Ok(count) => report.events_synced = count,
            Err(e) => errors.push(e),
        }
        match self.sync_reading_metadata().await {
            Ok(count) => report.readings_synced = count,
            Err(e) => errors.push(e),
        }
        match self.sync_image_binaries().await {
            Ok((uploaded, corrupted)) => {
                report.images_uploaded = uploaded;
                report.images_corrupted = corrupted;
            }
            Err(e) => errors.push(e),
        }

        (report, errors)
    }

    /// Upload one batch of event records, each with its image list.
    ///
    /// On success every event in the batch and the images that were sent
    /// with it are marked in a single transaction; on failure nothing is
    /// marked.
    pub async fn sync_event_metadata(&self) -> Result<usize> {
        let events = self.store.get_unsynced_events(EVENT_BATCH_SIZE)?;
        if events.is_empty() {
            return Ok(0);
        }

        let mut batch = Vec::with_capacity(events.len());
        let mut image_ids = Vec::new();
        for event in &events {
            let images = self.store.get_images_for_event(event.event_id)?;
            image_ids.extend(images.iter().map(|i| i.id));
            batch.push(event.to_metadata(&self.device_id, &images));
        }

        self.uplink
            .upload_event_metadata(&batch)
            .await
            .map_err(Error::Uplink)?;

        let ids: Vec<i64> = events.iter().map(|e| e.event_id).collect();
        self.store.mark_events_synced(&ids, &image_ids)?;
        info!("Uploaded metadata for {} event(s)", ids.len());
        Ok(ids.len())
    }

    /// Upload one batch of sensor readings.
    pub async fn sync_reading_metadata(&self) -> Result<usize> {
        let readings = self.store.get_unsynced_readings(READING_BATCH_SIZE)?;
        if readings.is_empty() {
            return Ok(0);
        }

        let batch: Vec<_> = readings
            .iter()
            .map(|r| r.to_metadata(&self.device_id))
            .collect();
        self.uplink
            .upload_reading_metadata(&batch)
            .await
            .map_err(Error::Uplink)?;

        let ids: Vec<i64> = readings.iter().map(|r| r.reading_id).collect();
        self.store.mark_readings_uploaded(&ids)?;
        info!("Uploaded {} sensor reading(s)", ids.len());
        Ok(ids.len())
    }

    /// Upload up to [`IMAGE_BATCH_SIZE`] image payloads.
    ///
    /// Each image gets exactly one attempt. Any failure, including a payload
    /// that can no longer be read from disk, marks the image corrupted so it
    /// is never selected again. Returns `(uploaded, corrupted)`.
    pub async fn sync_image_binaries(&self) -> Result<(usize, usize)> {
        let images = self.store.get_unsynced_images(IMAGE_BATCH_SIZE)?;
        let mut uploaded = 0;
        let mut corrupted = 0;

        for image in &images {
            match self.upload_image(image).await {
                Ok(()) => {
                    self.store.mark_image_uploaded(image.id)?;
                    debug!(
                        image_id = image.id,
                        event_id = image.event_id,
                        image_index = image.image_index,
                        "Uploaded image"
                    );
                    uploaded += 1;
                }
                Err(e) => {
                    warn!(
                        image_id = image.id,
                        event_id = image.event_id,
                        image_index = image.image_index,
                        cause = failure_cause(&e),
                        "Image upload failed, marking corrupted: {}",
                        e
                    );
                    self.store.mark_image_corrupted(image.id)?;
                    corrupted += 1;
                }
            }
        }

        Ok((uploaded, corrupted))
    }

    async fn upload_image(&self, image: &StoredImage) -> Result<()> {
        let bytes = tokio::fs::read(&image.local_path)
            .await
            .map_err(|e| Error::ReadImage {
                path: image.local_path.clone(),
                source: e,
            })?;

        self.uplink
            .upload_image_binary(image.event_id, image.image_index, bytes, &image.checksum_hex)
            .await
            .map_err(Error::Uplink)
    }
}

/// Short label for why an image payload did not go up.
fn failure_cause(error: &Error) -> &'static str {
    match error {
        Error::Uplink(e) if e.is_transport() => "unreachable",
        Error::Uplink(_) => "rejected",
        Error::ReadImage { .. } => "unreadable",
        _ => "other",
    }
}

#[async_trait]
impl PeriodicTask for SyncEngine {
    fn name(&self) -> &'static str {
        "sync"
    }

    async fn tick(&mut self) -> Result<()> {
        let (report, errors) = self.sync_once().await;
        if !report.is_empty() {
            debug!(?report, "Sync tick complete");
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Sync(errors))
        }
    }
}
