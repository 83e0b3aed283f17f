//! Error types for larva-core.
//!
//! Producers and the uplink report failures through one [`Error`] enum. The
//! agent loops never stop on any of them; what differs is the follow-up:
//!
//! | Error | Raised by | Follow-up |
//! |-------|-----------|-----------|
//! | [`Error::Unavailable`] | camera, sensor | Skip the capture tick |
//! | [`Error::CaptureFailed`] | camera | Skip the capture tick |
//! | [`Error::ReadFailed`] | sensor | Skip the capture tick |
//! | [`Error::NotReachable`] | uplink | Heartbeat and metadata: skip the step, retry next tick |
//! | [`Error::Transport`] | uplink | Heartbeat and metadata: skip the step, retry next tick |
//! | [`Error::UploadRejected`] | uplink | Image is marked corrupted |
//! | [`Error::InvalidUrl`] | uplink construction | Fix configuration |
//! | [`Error::Io`] | file access | Depends on caller |
//!
//! Image payloads get a single attempt: a failed image upload is marked
//! corrupted whatever the error kind, transport failures included.

use thiserror::Error;

/// Errors raised by capture producers and the server uplink.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The camera or sensor hardware/tool is not present on this system.
    #[error("{0} is not available")]
    Unavailable(String),

    /// The camera failed while capturing.
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    /// The sensor returned no usable sample.
    #[error("Sensor read failed: {0}")]
    ReadFailed(String),

    /// The server could not be reached (connect error, timeout).
    #[error("Server not reachable at {url}: {source}")]
    NotReachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Any other network-level failure: unexpected status, malformed body.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server explicitly refused an image payload.
    #[error("Upload rejected ({status}): {message}")]
    UploadRejected { status: u16, message: String },

    /// Invalid server URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this is a network failure that the next tick may not see again.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::NotReachable { .. } | Error::Transport(_))
    }
}

/// Result type alias using larva-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
