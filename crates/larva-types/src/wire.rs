//! Records exchanged with the remote server.
//!
//! Field names follow the server's JSON contract exactly:
//!
//! - heartbeat: `{device_id, last_event_id}` → `{delete_safe_up_to_event_id}`
//! - metadata upload: a JSON array of [`EventMetadata`] or [`ReadingMetadata`]
//! - image upload: raw bytes addressed by device, event and image index

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::ImageFormat;

/// Heartbeat request body.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeartbeatRequest {
    /// Device identity from configuration.
    pub device_id: String,
    /// Highest event identifier recorded locally (0 when none).
    pub last_event_id: i64,
}

/// Heartbeat response body.
///
/// A missing or `null` watermark means the server has not yet guaranteed
/// anything for this device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeartbeatResponse {
    #[cfg_attr(feature = "serde", serde(default))]
    pub delete_safe_up_to_event_id: Option<i64>,
}

/// Per-image metadata nested inside an [`EventMetadata`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImageMetadata {
    pub image_index: u32,
    pub size_bytes: u64,
    pub sha256_hex: String,
    pub width_px: u32,
    pub height_px: u32,
    pub format: ImageFormat,
}

/// Metadata record for one capture event and its burst.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventMetadata {
    pub device_id: String,
    pub event_local_id: i64,
    pub crate_id: i64,
    pub camera_name: String,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub captured_at: OffsetDateTime,
    pub burst_size: u32,
    pub images: Vec<ImageMetadata>,
}

/// Metadata record for one sensor reading.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReadingMetadata {
    pub device_id: String,
    pub reading_local_id: i64,
    pub crate_id: i64,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub recorded_at: OffsetDateTime,
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_response_null_watermark() {
        let resp: HeartbeatResponse =
            serde_json::from_str(r#"{"delete_safe_up_to_event_id": null}"#).unwrap();
        assert_eq!(resp.delete_safe_up_to_event_id, None);

        let resp: HeartbeatResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(resp.delete_safe_up_to_event_id, None);

        let resp: HeartbeatResponse =
            serde_json::from_str(r#"{"delete_safe_up_to_event_id": 5, "extra": true}"#).unwrap();
        assert_eq!(resp.delete_safe_up_to_event_id, Some(5));
    }

    #[test]
    fn test_event_metadata_field_names() {
        let record = EventMetadata {
            device_id: "device-001".to_string(),
            event_local_id: 7,
            crate_id: 1,
            camera_name: "camera_0".to_string(),
            captured_at: OffsetDateTime::UNIX_EPOCH,
            burst_size: 1,
            images: vec![ImageMetadata {
                image_index: 0,
                size_bytes: 1024,
                sha256_hex: "ab".repeat(32),
                width_px: 640,
                height_px: 480,
                format: ImageFormat::Jpeg,
            }],
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["event_local_id"], 7);
        assert_eq!(json["captured_at"], "1970-01-01T00:00:00Z");
        assert_eq!(json["images"][0]["image_index"], 0);
        assert_eq!(json["images"][0]["format"], "jpg");
        assert_eq!(json["images"][0]["sha256_hex"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn test_reading_metadata_allows_missing_values() {
        let record = ReadingMetadata {
            device_id: "device-001".to_string(),
            reading_local_id: 3,
            crate_id: 1,
            recorded_at: OffsetDateTime::UNIX_EPOCH,
            temperature_c: Some(21.5),
            humidity_pct: None,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["temperature_c"], 21.5);
        assert!(json["humidity_pct"].is_null());
    }
}
