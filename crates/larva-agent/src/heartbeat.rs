//! Heartbeat: reports progress and receives the safe-delete watermark.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use larva_core::Uplink;
use larva_store::{EntityKind, Store};

use crate::error::{Error, Result};
use crate::worker::PeriodicTask;

/// Sends the highest local event id and stores the watermark the server
/// answers with.
pub struct HeartbeatTask {
    store: Arc<Store>,
    uplink: Arc<dyn Uplink>,
}

impl HeartbeatTask {
    pub fn new(store: Arc<Store>, uplink: Arc<dyn Uplink>) -> Self {
        Self { store, uplink }
    }

    /// Send one heartbeat and return the watermark received, if any.
    ///
    /// The stored watermark is replaced verbatim when the server sends one.
    /// A failed heartbeat or an empty answer leaves it as it was.
    pub async fn beat(&self) -> Result<Option<i64>> {
        let last_event_id = self.store.max_id(EntityKind::Event)?.unwrap_or(0);

        let watermark = self
            .uplink
            .send_heartbeat(last_event_id)
            .await
            .map_err(Error::Uplink)?;

        match watermark {
            Some(watermark) => {
                let previous = self.store.get_watermark().ok().flatten();
                self.store.set_watermark(watermark)?;
                if previous != Some(watermark) {
                    info!(last_event_id, watermark, "Watermark updated");
                } else {
                    debug!(last_event_id, watermark, "Heartbeat acknowledged");
                }
            }
            None => debug!(last_event_id, "Heartbeat acknowledged without watermark"),
        }

        Ok(watermark)
    }
}

#[async_trait]
impl PeriodicTask for HeartbeatTask {
    fn name(&self) -> &'static str {
        "heartbeat"
    }

    async fn tick(&mut self) -> Result<()> {
        self.beat().await.map(|_| ())
    }
}
