//! Platform-agnostic types for the SmartLarva edge capture agent.
//!
//! This crate holds the values that flow between the capture producers
//! (`larva-core`), the local store (`larva-store`) and the remote server:
//!
//! - [`ImageArtifact`]: one image written to disk by a camera backend
//! - [`SensorSample`]: one temperature/humidity sample
//! - [`wire`]: JSON records exchanged with the server
//!
//! # Example
//!
//! ```
//! use larva_types::ImageFormat;
//!
//! let format: ImageFormat = "jpg".parse().unwrap();
//! assert_eq!(format.as_tag(), "jpg");
//! ```

pub mod error;
pub mod types;
pub mod wire;

pub use error::{ParseError, ParseResult};
pub use types::{ImageArtifact, ImageFormat, SensorSample};
pub use wire::{
    EventMetadata, HeartbeatRequest, HeartbeatResponse, ImageMetadata, ReadingMetadata,
};
