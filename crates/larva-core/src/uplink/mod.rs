//! Server uplink.
//!
//! The [`Uplink`] trait is the narrow interface the agent loops use to talk
//! to the server. [`HttpUplink`] implements it over HTTP/JSON;
//! [`MockUplink`] records calls for tests.

mod http;
mod mock;

use async_trait::async_trait;

use larva_types::{EventMetadata, ReadingMetadata};

use crate::error::Result;

pub use http::HttpUplink;
pub use mock::{ImageFailure, MockUplink, UplinkCall};

/// Header carrying the SHA-256 of an image payload.
pub const CHECKSUM_HEADER: &str = "X-Checksum-SHA256";

/// Operations the agent performs against the server.
///
/// Every call either succeeds as a whole or fails as a whole; there is no
/// partial acceptance of a metadata batch.
#[async_trait]
pub trait Uplink: Send + Sync {
    /// Report the highest local event id and receive the safe-delete
    /// watermark, if the server has one for this device.
    async fn send_heartbeat(&self, last_event_id: i64) -> Result<Option<i64>>;

    /// Upload a batch of capture event records.
    async fn upload_event_metadata(&self, batch: &[EventMetadata]) -> Result<()>;

    /// Upload a batch of sensor reading records.
    async fn upload_reading_metadata(&self, batch: &[ReadingMetadata]) -> Result<()>;

    /// Upload one image payload along with its capture-time checksum.
    async fn upload_image_binary(
        &self,
        event_id: i64,
        image_index: u32,
        bytes: Vec<u8>,
        checksum_hex: &str,
    ) -> Result<()>;
}
