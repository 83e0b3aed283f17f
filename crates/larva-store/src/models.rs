//! Data models for stored rows.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use larva_types::{
    EventMetadata, ImageArtifact, ImageFormat, ImageMetadata, ReadingMetadata, SensorSample,
};

/// A crate (physical container of subjects) that events attach to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCrate {
    /// Identifier supplied by configuration.
    pub id: i64,
    /// Human-readable label.
    pub label: String,
    /// Where the crate is kept.
    pub location: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// When the crate was started.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the crate was ended, if it has been.
    #[serde(with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
}

/// A capture event about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub event_id: i64,
    pub crate_id: i64,
    pub camera_name: String,
    pub captured_at: OffsetDateTime,
    /// Number of images the camera actually returned.
    pub burst_size: u32,
}

/// A capture event stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: i64,
    pub crate_id: i64,
    pub camera_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
    pub burst_size: u32,
    /// Metadata for this event has been accepted by the server.
    pub uploaded: bool,
}

impl StoredEvent {
    /// Build the transfer record for this event and its images.
    pub fn to_metadata(&self, device_id: &str, images: &[StoredImage]) -> EventMetadata {
        EventMetadata {
            device_id: device_id.to_string(),
            event_local_id: self.event_id,
            crate_id: self.crate_id,
            camera_name: self.camera_name.clone(),
            captured_at: self.captured_at,
            burst_size: self.burst_size,
            images: images.iter().map(StoredImage::to_metadata).collect(),
        }
    }
}

/// An image row about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub event_id: i64,
    pub image_index: u32,
    pub local_path: PathBuf,
    pub captured_at: OffsetDateTime,
    pub size_bytes: u64,
    pub checksum_hex: String,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

impl NewImage {
    /// Create a NewImage from a camera artifact belonging to `event_id`.
    pub fn from_artifact(event_id: i64, artifact: &ImageArtifact) -> Self {
        Self {
            event_id,
            image_index: artifact.index,
            local_path: artifact.path.clone(),
            captured_at: artifact.captured_at,
            size_bytes: artifact.size_bytes,
            checksum_hex: artifact.checksum_hex.clone(),
            width: artifact.width,
            height: artifact.height,
            format: artifact.format,
        }
    }
}

/// An image stored in the database.
///
/// The four flags move independently:
/// - `metadata_uploaded` / `uploaded` are set by the sync engine
/// - `corrupted` is terminal and never coexists with `uploaded`
/// - `local_exists` is cleared by cleanup once the payload is gone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredImage {
    /// Database row ID.
    pub id: i64,
    pub event_id: i64,
    pub image_index: u32,
    pub local_path: PathBuf,
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
    pub size_bytes: u64,
    pub checksum_hex: String,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub metadata_uploaded: bool,
    pub uploaded: bool,
    pub local_exists: bool,
    pub corrupted: bool,
}

impl StoredImage {
    /// The per-image part of an event's transfer record.
    pub fn to_metadata(&self) -> ImageMetadata {
        ImageMetadata {
            image_index: self.image_index,
            size_bytes: self.size_bytes,
            sha256_hex: self.checksum_hex.clone(),
            width_px: self.width,
            height_px: self.height,
            format: self.format,
        }
    }
}

/// A sensor reading about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub reading_id: i64,
    pub crate_id: i64,
    pub recorded_at: OffsetDateTime,
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
}

impl NewReading {
    /// Create a NewReading from a sensor sample.
    pub fn from_sample(reading_id: i64, crate_id: i64, sample: &SensorSample) -> Self {
        Self {
            reading_id,
            crate_id,
            recorded_at: sample.recorded_at,
            temperature_c: sample.temperature_c,
            humidity_pct: sample.humidity_pct,
        }
    }
}

/// A sensor reading stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    pub reading_id: i64,
    pub crate_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub uploaded: bool,
}

impl StoredReading {
    /// Build the transfer record for this reading.
    pub fn to_metadata(&self, device_id: &str) -> ReadingMetadata {
        ReadingMetadata {
            device_id: device_id.to_string(),
            reading_local_id: self.reading_id,
            crate_id: self.crate_id,
            recorded_at: self.recorded_at,
            temperature_c: self.temperature_c,
            humidity_pct: self.humidity_pct,
        }
    }
}

/// Entities whose identifiers are allocated on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// Capture events (`event_id`).
    Event,
    /// Sensor readings (`reading_id`).
    Reading,
}

/// Backlog summary across all tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub events_total: u64,
    pub events_pending: u64,
    pub images_total: u64,
    /// Images whose metadata is not yet uploaded.
    pub images_metadata_pending: u64,
    /// Images waiting for a binary upload attempt.
    pub images_binary_pending: u64,
    pub images_uploaded: u64,
    pub images_corrupted: u64,
    /// Images whose payload has been removed from disk.
    pub images_deleted: u64,
    pub readings_total: u64,
    pub readings_pending: u64,
    /// Current safe-delete watermark, if any.
    pub watermark: Option<i64>,
}
