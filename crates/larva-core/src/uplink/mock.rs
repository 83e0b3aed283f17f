//! Mock uplink for testing.
//!
//! [`MockUplink`] records every call it receives and answers from state the
//! test controls. Image payloads are verified against their checksum the way
//! the server does, so a mismatch is rejected.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use larva_types::{EventMetadata, ReadingMetadata};

use super::Uplink;
use crate::checksum::sha256_hex;
use crate::error::{Error, Result};

/// Sentinel stored in the watermark atomic when the server has none.
const NO_WATERMARK: i64 = i64::MIN;

/// A call received by [`MockUplink`].
#[derive(Debug, Clone, PartialEq)]
pub enum UplinkCall {
    Heartbeat {
        last_event_id: i64,
    },
    EventMetadata(Vec<EventMetadata>),
    ReadingMetadata(Vec<ReadingMetadata>),
    ImageBinary {
        event_id: i64,
        image_index: u32,
        size_bytes: usize,
        checksum_hex: String,
    },
}

/// How image uploads should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFailure {
    /// The server cannot be reached.
    Transport,
    /// The server refuses the payload.
    Rejected,
}

/// An in-memory stand-in for the server.
#[derive(Debug)]
pub struct MockUplink {
    watermark: AtomicI64,
    fail_heartbeat: AtomicBool,
    fail_metadata: AtomicBool,
    image_failure: RwLock<Option<ImageFailure>>,
    calls: RwLock<Vec<UplinkCall>>,
}

impl Default for MockUplink {
    fn default() -> Self {
        Self {
            watermark: AtomicI64::new(NO_WATERMARK),
            fail_heartbeat: AtomicBool::new(false),
            fail_metadata: AtomicBool::new(false),
            image_failure: RwLock::new(None),
            calls: RwLock::new(Vec::new()),
        }
    }
}

impl MockUplink {
    /// Create a mock uplink that accepts everything and has no watermark.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the watermark returned by heartbeats.
    pub fn set_watermark(&self, watermark: Option<i64>) {
        self.watermark
            .store(watermark.unwrap_or(NO_WATERMARK), Ordering::Relaxed);
    }

    /// Make heartbeats fail with a transport error.
    pub fn set_heartbeat_fails(&self, fail: bool) {
        self.fail_heartbeat.store(fail, Ordering::Relaxed);
    }

    /// Make metadata uploads (events and readings) fail with a transport error.
    pub fn set_metadata_fails(&self, fail: bool) {
        self.fail_metadata.store(fail, Ordering::Relaxed);
    }

    /// Make image uploads fail.
    pub async fn set_image_failure(&self, failure: Option<ImageFailure>) {
        *self.image_failure.write().await = failure;
    }

    /// All calls received so far, in order.
    pub async fn calls(&self) -> Vec<UplinkCall> {
        self.calls.read().await.clone()
    }

    /// Event metadata batches received so far.
    pub async fn event_batches(&self) -> Vec<Vec<EventMetadata>> {
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|call| match call {
                UplinkCall::EventMetadata(batch) => Some(batch.clone()),
                _ => None,
            })
            .collect()
    }

    /// Reading metadata batches received so far.
    pub async fn reading_batches(&self) -> Vec<Vec<ReadingMetadata>> {
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|call| match call {
                UplinkCall::ReadingMetadata(batch) => Some(batch.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(event_id, image_index)` of every image upload attempt.
    pub async fn image_attempts(&self) -> Vec<(i64, u32)> {
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|call| match call {
                UplinkCall::ImageBinary {
                    event_id,
                    image_index,
                    ..
                } => Some((*event_id, *image_index)),
                _ => None,
            })
            .collect()
    }

    /// Forget all recorded calls.
    pub async fn clear_calls(&self) {
        self.calls.write().await.clear();
    }

    async fn record(&self, call: UplinkCall) {
        self.calls.write().await.push(call);
    }
}

#[async_trait]
impl Uplink for MockUplink {
    async fn send_heartbeat(&self, last_event_id: i64) -> Result<Option<i64>> {
        self.record(UplinkCall::Heartbeat { last_event_id }).await;

        if self.fail_heartbeat.load(Ordering::Relaxed) {
            return Err(Error::Transport("mock heartbeat failure".to_string()));
        }

        let watermark = self.watermark.load(Ordering::Relaxed);
        Ok((watermark != NO_WATERMARK).then_some(watermark))
    }

    async fn upload_event_metadata(&self, batch: &[EventMetadata]) -> Result<()> {
        self.record(UplinkCall::EventMetadata(batch.to_vec())).await;

        if self.fail_metadata.load(Ordering::Relaxed) {
            return Err(Error::Transport("mock metadata failure".to_string()));
        }
        Ok(())
    }

    async fn upload_reading_metadata(&self, batch: &[ReadingMetadata]) -> Result<()> {
        self.record(UplinkCall::ReadingMetadata(batch.to_vec())).await;

        if self.fail_metadata.load(Ordering::Relaxed) {
            return Err(Error::Transport("mock metadata failure".to_string()));
        }
        Ok(())
    }

    async fn upload_image_binary(
        &self,
        event_id: i64,
        image_index: u32,
        bytes: Vec<u8>,
        checksum_hex: &str,
    ) -> Result<()> {
        self.record(UplinkCall::ImageBinary {
            event_id,
            image_index,
            size_bytes: bytes.len(),
            checksum_hex: checksum_hex.to_string(),
        })
        .await;

        match *self.image_failure.read().await {
            Some(ImageFailure::Transport) => {
                return Err(Error::Transport("mock image upload failure".to_string()));
            }
            Some(ImageFailure::Rejected) => {
                return Err(Error::UploadRejected {
                    status: 400,
                    message: "mock rejection".to_string(),
                });
            }
            None => {}
        }

        if sha256_hex(&bytes) != checksum_hex {
            return Err(Error::UploadRejected {
                status: 400,
                message: "checksum mismatch".to_string(),
            });
        }

        Ok(())
    }
}
