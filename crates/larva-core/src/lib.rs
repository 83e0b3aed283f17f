//! Capture producers and server uplink for the SmartLarva edge agent.
//!
//! This crate holds the narrow capability interfaces the agent loops depend
//! on, each with a real and a mock variant selected once from configuration:
//!
//! | Capability | Trait | Variants |
//! |------------|-------|----------|
//! | Camera | [`CameraBackend`] | [`MockCamera`], [`LibcameraCamera`] |
//! | Sensor | [`SensorBackend`] | [`MockSensor`], [`Dht22Sensor`] |
//! | Server | [`Uplink`] | [`HttpUplink`], [`MockUplink`] |
//!
//! Image checksums are computed here, once, from the bytes on disk right
//! after capture.

pub mod camera;
pub mod checksum;
pub mod error;
pub mod sensor;
pub mod uplink;

pub use camera::{CameraBackend, LibcameraCamera, MockCamera, image_file_name};
pub use checksum::{FileDigest, sha256_file, sha256_hex};
pub use error::{Error, Result};
pub use sensor::{Dht22Sensor, MockSensor, SensorBackend};
pub use uplink::{CHECKSUM_HEADER, HttpUplink, ImageFailure, MockUplink, Uplink, UplinkCall};

// Re-export types for convenience
pub use larva_types;
