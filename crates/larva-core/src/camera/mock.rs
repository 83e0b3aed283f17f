//! Synthetic camera for development and testing.
//!
//! Frames are a random base colour with a gradient so consecutive frames
//! differ, encoded as JPEG with the `image` crate.
//!
//! # Features
//!
//! - **Failure injection**: fail whole bursts with [`MockCamera::set_should_fail`]
//! - **Partial bursts**: cap the frames written with [`MockCamera::set_frame_limit`]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use time::OffsetDateTime;
use tracing::debug;

use larva_types::{ImageArtifact, ImageFormat};

use super::{CameraBackend, artifact_from_file, image_file_name};
use crate::error::{Error, Result};

const JPEG_QUALITY: u8 = 90;

/// A camera that generates images instead of reading a sensor.
///
/// # Example
///
/// ```
/// use larva_core::{CameraBackend, MockCamera};
///
/// # #[tokio::main]
/// # async fn main() -> larva_core::Result<()> {
/// let dir = std::env::temp_dir().join("larva-doc-mock-camera");
/// let camera = MockCamera::new(64, 48);
/// let burst = camera.capture_burst(1, &dir, 2).await?;
/// assert_eq!(burst.len(), 2);
/// assert_eq!(burst[1].index, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MockCamera {
    width: u32,
    height: u32,
    should_fail: AtomicBool,
    /// Maximum frames written per burst (`u32::MAX` = unlimited).
    frame_limit: AtomicU32,
    burst_count: AtomicU32,
}

impl MockCamera {
    /// Create a mock camera producing frames of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            should_fail: AtomicBool::new(false),
            frame_limit: AtomicU32::new(u32::MAX),
            burst_count: AtomicU32::new(0),
        }
    }

    /// Make every following burst fail with [`Error::CaptureFailed`].
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Write at most `limit` frames per burst, simulating a partial failure.
    pub fn set_frame_limit(&self, limit: Option<u32>) {
        self.frame_limit
            .store(limit.unwrap_or(u32::MAX), Ordering::Relaxed);
    }

    /// Number of bursts attempted so far.
    pub fn burst_count(&self) -> u32 {
        self.burst_count.load(Ordering::Relaxed)
    }

    fn render_frame(&self, index: u32) -> Result<Vec<u8>> {
        let base: [u8; 3] = rand::random();
        let shift = (index as u8).wrapping_mul(29);
        let frame = RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb([
                base[0].wrapping_add((x % 256) as u8),
                base[1].wrapping_add((y % 256) as u8),
                base[2].wrapping_add(shift),
            ])
        });

        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
            .encode_image(&frame)
            .map_err(|e| Error::CaptureFailed(format!("JPEG encoding failed: {e}")))?;
        Ok(bytes)
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

#[async_trait]
impl CameraBackend for MockCamera {
    async fn capture_burst(
        &self,
        event_id: i64,
        out_dir: &Path,
        count: u32,
    ) -> Result<Vec<ImageArtifact>> {
        self.burst_count.fetch_add(1, Ordering::Relaxed);

        if self.should_fail.load(Ordering::Relaxed) {
            return Err(Error::CaptureFailed("mock camera failure".to_string()));
        }

        tokio::fs::create_dir_all(out_dir).await?;

        let frames = count.min(self.frame_limit.load(Ordering::Relaxed));
        let captured_at = OffsetDateTime::now_utc();
        let mut artifacts = Vec::with_capacity(frames as usize);

        for index in 0..frames {
            let bytes = self.render_frame(index)?;
            let path = out_dir.join(image_file_name(event_id, index, ImageFormat::Jpeg));
            tokio::fs::write(&path, &bytes).await?;

            let artifact = artifact_from_file(
                index,
                path,
                (self.width, self.height),
                ImageFormat::Jpeg,
                captured_at,
            )
            .await?;
            artifacts.push(artifact);
        }

        debug!(event_id, "Mock camera wrote {} of {} frames", frames, count);
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::sha256_hex;

    #[tokio::test]
    async fn test_burst_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("images");
        let camera = MockCamera::new(32, 24);

        let burst = camera.capture_burst(7, &out, 3).await.unwrap();
        assert_eq!(burst.len(), 3);

        for (i, artifact) in burst.iter().enumerate() {
            assert_eq!(artifact.index, i as u32);
            assert_eq!(artifact.width, 32);
            assert_eq!(artifact.height, 24);
            assert_eq!(artifact.format, ImageFormat::Jpeg);
            assert_eq!(
                artifact.path,
                out.join(format!("00000007_{i:03}.jpg"))
            );

            let bytes = std::fs::read(&artifact.path).unwrap();
            assert_eq!(artifact.size_bytes, bytes.len() as u64);
            assert_eq!(artifact.checksum_hex, sha256_hex(&bytes));
        }
    }

    #[tokio::test]
    async fn test_frames_are_valid_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let camera = MockCamera::new(16, 8);

        let burst = camera.capture_burst(1, dir.path(), 1).await.unwrap();
        let dims = image::image_dimensions(&burst[0].path).unwrap();
        assert_eq!(dims, (16, 8));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let dir = tempfile::tempdir().unwrap();
        let camera = MockCamera::new(8, 8);
        camera.set_should_fail(true);

        let result = camera.capture_burst(1, dir.path(), 2).await;
        assert!(matches!(result, Err(Error::CaptureFailed(_))));
        assert_eq!(camera.burst_count(), 1);

        camera.set_should_fail(false);
        assert_eq!(camera.capture_burst(2, dir.path(), 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_partial_burst() {
        let dir = tempfile::tempdir().unwrap();
        let camera = MockCamera::new(8, 8);
        camera.set_frame_limit(Some(1));

        let burst = camera.capture_burst(1, dir.path(), 5).await.unwrap();
        assert_eq!(burst.len(), 1);
        assert_eq!(burst[0].index, 0);
    }

    #[tokio::test]
    async fn test_zero_count() {
        let dir = tempfile::tempdir().unwrap();
        let camera = MockCamera::new(8, 8);
        assert!(camera.capture_burst(1, dir.path(), 0).await.unwrap().is_empty());
    }
}
