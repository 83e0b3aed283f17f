//! Raspberry Pi camera driven through `libcamera-still`.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::process::Command;
use tracing::{debug, warn};

use larva_types::{ImageArtifact, ImageFormat};

use super::{CameraBackend, artifact_from_file, image_file_name};
use crate::error::{Error, Result};

/// Default capture tool.
pub const LIBCAMERA_STILL: &str = "libcamera-still";

/// Delay between frames of a burst, in milliseconds.
const TIMELAPSE_MS: u32 = 100;

/// A camera backed by the `libcamera-still` command-line tool.
///
/// The whole burst is taken by a single invocation in timelapse mode. The
/// tool numbers frames from zero, so frame `i` lands at
/// `{event:08}_{i:03}.jpg`. Frames missing after the tool exits are skipped.
#[derive(Debug, Clone)]
pub struct LibcameraCamera {
    program: PathBuf,
    leading_args: Vec<OsString>,
    width: u32,
    height: u32,
    quality: u8,
}

impl LibcameraCamera {
    /// Create a camera capturing at the given resolution.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            program: PathBuf::from(LIBCAMERA_STILL),
            leading_args: Vec::new(),
            width,
            height,
            quality: 90,
        }
    }

    /// Use a different executable, with arguments placed before the capture
    /// arguments.
    pub fn with_program(
        mut self,
        program: impl Into<PathBuf>,
        leading_args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        self.program = program.into();
        self.leading_args = leading_args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the JPEG quality (1-100).
    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    /// Arguments for one burst of `count` frames.
    fn capture_args(&self, event_id: i64, out_dir: &Path, count: u32) -> Vec<OsString> {
        let pattern = out_dir.join(format!("{event_id:08}_%03d.jpg"));
        let capture: [OsString; 13] = [
            "-n".into(),
            "-o".into(),
            pattern.into_os_string(),
            "--width".into(),
            self.width.to_string().into(),
            "--height".into(),
            self.height.to_string().into(),
            "--quality".into(),
            self.quality.to_string().into(),
            "--timelapse".into(),
            TIMELAPSE_MS.to_string().into(),
            "--frames".into(),
            count.to_string().into(),
        ];

        let mut args = self.leading_args.clone();
        args.extend(capture);
        args
    }
}

#[async_trait]
impl CameraBackend for LibcameraCamera {
    async fn capture_burst(
        &self,
        event_id: i64,
        out_dir: &Path,
        count: u32,
    ) -> Result<Vec<ImageArtifact>> {
        tokio::fs::create_dir_all(out_dir).await?;

        let output = Command::new(&self.program)
            .args(self.capture_args(event_id, out_dir, count))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    Error::Unavailable(self.program.display().to_string())
                } else {
                    Error::CaptureFailed(format!(
                        "failed to start {}: {e}",
                        self.program.display()
                    ))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::CaptureFailed(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        let mut artifacts = Vec::with_capacity(count as usize);
        for index in 0..count {
            let path = out_dir.join(image_file_name(event_id, index, ImageFormat::Jpeg));
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                continue;
            }

            let dimensions = match image::image_dimensions(&path) {
                Ok(dims) => dims,
                Err(e) => {
                    debug!("Could not read dimensions of {}: {}", path.display(), e);
                    (self.width, self.height)
                }
            };

            let artifact = artifact_from_file(
                index,
                path,
                dimensions,
                ImageFormat::Jpeg,
                OffsetDateTime::now_utc(),
            )
            .await?;
            artifacts.push(artifact);
        }

        if artifacts.len() < count as usize {
            warn!(
                event_id,
                "libcamera-still produced {} of {} frames",
                artifacts.len(),
                count
            );
        }

        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_args() {
        let camera = LibcameraCamera::new(4056, 3040).quality(85);
        let args = camera.capture_args(42, Path::new("/data/images"), 10);
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            vec![
                "-n",
                "-o",
                "/data/images/00000042_%03d.jpg",
                "--width",
                "4056",
                "--height",
                "3040",
                "--quality",
                "85",
                "--timelapse",
                "100",
                "--frames",
                "10",
            ]
        );
    }

    #[test]
    fn test_quality_is_clamped() {
        let camera = LibcameraCamera::new(1, 1).quality(0);
        assert_eq!(camera.quality, 1);
        let camera = LibcameraCamera::new(1, 1).quality(200);
        assert_eq!(camera.quality, 100);
    }

    #[tokio::test]
    async fn test_missing_tool_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let camera = LibcameraCamera::new(640, 480)
            .with_program("/nonexistent/libcamera-still", Vec::<String>::new());

        let result = camera.capture_burst(1, dir.path(), 2).await;
        assert!(matches!(result, Err(Error::Unavailable(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_tool_is_capture_failed() {
        let dir = tempfile::tempdir().unwrap();
        let camera = LibcameraCamera::new(640, 480)
            .with_program("sh", ["-c", "echo 'no cameras available' >&2; exit 1", "sh"]);

        match camera.capture_burst(1, dir.path(), 2).await {
            Err(Error::CaptureFailed(message)) => {
                assert!(message.contains("no cameras available"));
            }
            other => panic!("expected CaptureFailed, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_frames_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        // Writes only frame 1 of the requested burst
        let script = format!(
            "printf 'frame' > '{}'",
            dir.path().join("00000005_001.jpg").display()
        );
        let camera =
            LibcameraCamera::new(320, 240).with_program("sh", ["-c".to_string(), script]);

        let burst = camera.capture_burst(5, dir.path(), 3).await.unwrap();
        assert_eq!(burst.len(), 1);
        assert_eq!(burst[0].index, 1);
        assert_eq!(burst[0].size_bytes, 5);
        // Not a decodable image, so the configured size is reported
        assert_eq!((burst[0].width, burst[0].height), (320, 240));
        assert_eq!(
            burst[0].checksum_hex,
            crate::checksum::sha256_hex(b"frame")
        );
    }
}
