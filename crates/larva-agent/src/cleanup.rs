//! Retention cleanup: deletes local image payloads the server already holds.

use std::io::ErrorKind;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use larva_store::{CleanupQuery, DEFAULT_CLEANUP_LIMIT, Store};

use crate::error::Result;
use crate::worker::PeriodicTask;

/// Counts from one cleanup tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Whether a watermark was available.
    pub ran: bool,
    pub candidates: usize,
    /// Rows marked deleted, including payloads that were already gone.
    pub deleted: usize,
    /// Payloads that could not be removed and were left for the next tick.
    pub failed: usize,
}

/// Removes payloads of images at or below the watermark once they are older
/// than the retention window.
///
/// Without a watermark nothing is ever deleted.
pub struct CleanupEngine {
    store: Arc<Store>,
    retention_days: u32,
    batch_size: u32,
}

impl CleanupEngine {
    pub fn new(store: Arc<Store>, retention_days: u32) -> Self {
        Self {
            store,
            retention_days,
            batch_size: DEFAULT_CLEANUP_LIMIT,
        }
    }

    /// Maximum payloads removed per tick.
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Run one cleanup pass.
    pub async fn cleanup_once(&self) -> Result<CleanupReport> {
        let Some(watermark) = self.store.get_watermark()? else {
            debug!("No watermark yet, skipping cleanup");
            return Ok(CleanupReport::default());
        };

        let query = CleanupQuery::new(watermark)
            .retention_days(self.retention_days)
            .limit(self.batch_size);
        let candidates = self.store.query_cleanup_candidates(&query)?;

        let mut report = CleanupReport {
            ran: true,
            candidates: candidates.len(),
            ..Default::default()
        };

        for image in &candidates {
            match tokio::fs::remove_file(&image.local_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(
                        image_id = image.id,
                        "Payload already gone: {}",
                        image.local_path.display()
                    );
                }
                Err(e) => {
                    warn!(
                        image_id = image.id,
                        "Failed to remove {}: {}",
                        image.local_path.display(),
                        e
                    );
                    report.failed += 1;
                    continue;
                }
            }

            self.store.mark_image_deleted(image.id)?;
            report.deleted += 1;
        }

        if report.deleted > 0 {
            info!(
                watermark,
                "Removed {} image payload(s) ({} failed)", report.deleted, report.failed
            );
        }

        Ok(report)
    }
}

#[async_trait]
impl PeriodicTask for CleanupEngine {
    fn name(&self) -> &'static str {
        "cleanup"
    }

    async fn tick(&mut self) -> Result<()> {
        self.cleanup_once().await.map(|_| ())
    }
}
