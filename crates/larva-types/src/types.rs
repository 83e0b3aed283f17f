//! Core value types produced by the capture backends.

use core::fmt;
use core::str::FromStr;
use std::path::PathBuf;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ParseError;

/// Encoding of an image payload on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ImageFormat {
    /// JPEG, tagged `jpg`.
    #[cfg_attr(feature = "serde", serde(rename = "jpg"))]
    Jpeg,
    /// PNG, tagged `png`.
    Png,
}

impl ImageFormat {
    /// The short tag stored locally and sent to the server.
    #[must_use]
    pub fn as_tag(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }

    /// File extension used when naming payloads.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        self.as_tag()
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl FromStr for ImageFormat {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            other => Err(ParseError::UnknownFormat(other.to_string())),
        }
    }
}

/// One image written to disk by a camera backend.
///
/// The checksum is the lower-case hex SHA-256 of the bytes as they were
/// written. It is computed once here and carried unchanged through the
/// store and the uplink.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImageArtifact {
    /// Position within the burst (0-based).
    pub index: u32,
    /// Where the payload lives on disk.
    pub path: PathBuf,
    /// Size of the payload in bytes.
    pub size_bytes: u64,
    /// Lower-case hex SHA-256 of the payload.
    pub checksum_hex: String,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    /// Payload encoding.
    pub format: ImageFormat,
    /// When the frame was taken.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub captured_at: OffsetDateTime,
}

/// A single environmental sample from a sensor backend.
///
/// Either value may be missing when the sensor only reports one quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorSample {
    /// Temperature in degrees Celsius.
    pub temperature_c: Option<f64>,
    /// Relative humidity in percent.
    pub humidity_pct: Option<f64>,
    /// When the sample was taken.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub recorded_at: OffsetDateTime,
}
