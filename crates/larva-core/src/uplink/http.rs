//! HTTP client for the SmartLarva server API.
//!
//! Endpoints:
//!
//! - `POST /api/heartbeat` with `{device_id, last_event_id}`, answered by
//!   `{delete_safe_up_to_event_id}`
//! - `POST /api/upload/metadata` with a JSON array of event or reading records
//! - `PUT /api/upload/image/{device_id}/{event_local_id}/{image_index}` with
//!   the raw payload and an `X-Checksum-SHA256` header
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use larva_core::{HttpUplink, Uplink};
//!
//! # async fn example() -> larva_core::Result<()> {
//! let uplink = HttpUplink::new("https://larva.example.com", "device-001", Duration::from_secs(10))?;
//! let watermark = uplink.send_heartbeat(42).await?;
//! println!("Safe to delete up to: {:?}", watermark);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Serialize;
use tracing::debug;

use larva_types::{EventMetadata, HeartbeatRequest, HeartbeatResponse, ReadingMetadata};

use super::{CHECKSUM_HEADER, Uplink};
use crate::error::{Error, Result};

/// HTTP implementation of [`Uplink`].
#[derive(Debug, Clone)]
pub struct HttpUplink {
    client: Client,
    base_url: String,
    device_id: String,
}

impl HttpUplink {
    /// Create a new uplink.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Server base URL (e.g., "https://larva.example.com")
    /// * `device_id` - Identity reported in heartbeats and image URLs
    /// * `timeout` - Bound on every request, including the body transfer
    pub fn new(base_url: &str, device_id: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {e}")))?;

        Self::with_client(base_url, device_id, client)
    }

    /// Create an uplink with a custom reqwest Client.
    pub fn with_client(base_url: &str, device_id: &str, client: Client) -> Result<Self> {
        // Normalize URL (remove trailing slash)
        let base_url = base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::InvalidUrl(format!(
                "URL must start with http:// or https://, got: {}",
                base_url
            )));
        }
        Url::parse(&base_url).map_err(|e| Error::InvalidUrl(format!("{base_url}: {e}")))?;

        Ok(Self {
            client,
            base_url,
            device_id: device_id.to_string(),
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the device identity.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Each path part is pushed as its own segment, so reserved characters
    /// in the device id are percent-encoded.
    fn image_url(&self, event_id: i64, image_index: u32) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend([
                "api",
                "upload",
                "image",
                self.device_id.as_str(),
                event_id.to_string().as_str(),
                image_index.to_string().as_str(),
            ]);
        Ok(url)
    }

    // ======================================================================
    // Internal HTTP helpers
    // ======================================================================

    async fn post_json<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Response> {
        self.client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::NotReachable {
                url: url.to_string(),
                source: e,
            })
    }

    async fn upload_metadata<B: Serialize + ?Sized>(&self, body: &B) -> Result<()> {
        let url = format!("{}/api/upload/metadata", self.base_url);
        let response = self.post_json(&url, body).await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let message = error_message(response).await;
            Err(Error::Transport(format!("{url} returned {status}: {message}")))
        }
    }
}

/// Extract a readable error message from a failed response.
async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| status.to_string())
}

#[async_trait]
impl Uplink for HttpUplink {
    async fn send_heartbeat(&self, last_event_id: i64) -> Result<Option<i64>> {
        let url = format!("{}/api/heartbeat", self.base_url);
        let request = HeartbeatRequest {
            device_id: self.device_id.clone(),
            last_event_id,
        };

        let response = self.post_json(&url, &request).await?;
        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(Error::Transport(format!(
                "{url} returned {status}: {message}"
            )));
        }

        let body: HeartbeatResponse = response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("malformed heartbeat response: {e}")))?;

        debug!(
            last_event_id,
            watermark = ?body.delete_safe_up_to_event_id,
            "Heartbeat acknowledged"
        );
        Ok(body.delete_safe_up_to_event_id)
    }

    async fn upload_event_metadata(&self, batch: &[EventMetadata]) -> Result<()> {
        self.upload_metadata(batch).await
    }

    async fn upload_reading_metadata(&self, batch: &[ReadingMetadata]) -> Result<()> {
        self.upload_metadata(batch).await
    }

    async fn upload_image_binary(
        &self,
        event_id: i64,
        image_index: u32,
        bytes: Vec<u8>,
        checksum_hex: &str,
    ) -> Result<()> {
        let url = self.image_url(event_id, image_index)?;
        let response = self
            .client
            .put(url.clone())
            .header(CHECKSUM_HEADER, checksum_hex)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| Error::NotReachable {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = error_message(response).await;
        if status.is_client_error() && status != StatusCode::REQUEST_TIMEOUT {
            Err(Error::UploadRejected {
                status: status.as_u16(),
                message,
            })
        } else {
            Err(Error::Transport(format!("{url} returned {status}: {message}")))
        }
    }
}
