//! Camera backends.
//!
//! A [`CameraBackend`] captures one burst of images for a capture event,
//! writes them below an output directory and returns one [`ImageArtifact`]
//! per image actually written. Backends may return fewer images than
//! requested; the caller records what it got.
//!
//! Two variants are provided and selected once from configuration:
//!
//! - [`MockCamera`] synthesises JPEG frames, for development and tests
//! - [`LibcameraCamera`] drives `libcamera-still` on a Raspberry Pi

mod libcamera;
mod mock;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use time::OffsetDateTime;

use larva_types::{ImageArtifact, ImageFormat};

use crate::checksum::sha256_file;
use crate::error::Result;

pub use libcamera::{LIBCAMERA_STILL, LibcameraCamera};
pub use mock::MockCamera;

/// A producer of image bursts.
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Capture up to `count` images for `event_id` into `out_dir`.
    ///
    /// The directory is created if it does not exist. Checksums are computed
    /// from the bytes read back from disk.
    async fn capture_burst(
        &self,
        event_id: i64,
        out_dir: &Path,
        count: u32,
    ) -> Result<Vec<ImageArtifact>>;
}

/// File name of one image of a burst, e.g. `00000042_003.jpg`.
pub fn image_file_name(event_id: i64, index: u32, format: ImageFormat) -> String {
    format!("{event_id:08}_{index:03}.{}", format.extension())
}

/// Build the artifact for a file that is already on disk.
pub(crate) async fn artifact_from_file(
    index: u32,
    path: PathBuf,
    (width, height): (u32, u32),
    format: ImageFormat,
    captured_at: OffsetDateTime,
) -> Result<ImageArtifact> {
    let digest = sha256_file(&path).await?;
    Ok(ImageArtifact {
        index,
        path,
        size_bytes: digest.size_bytes,
        checksum_hex: digest.checksum_hex,
        width,
        height,
        format,
        captured_at,
    })
}
