//! Query builder for cleanup candidates.
//!
//! An image is a cleanup candidate when all of these hold:
//!
//! - its payload is still on disk (`local_exists = 1`)
//! - its owning event is at or below the server's safe-delete watermark
//! - it was captured at or before `now - retention_days`
//!
//! Candidates are returned oldest capture first so the oldest data is freed
//! first under disk pressure.
//!
//! # Example
//!
//! ```
//! use larva_store::{CleanupQuery, Store};
//!
//! let store = Store::open_in_memory()?;
//! let query = CleanupQuery::new(42).retention_days(30).limit(20);
//! let candidates = store.query_cleanup_candidates(&query)?;
//! assert!(candidates.is_empty());
//! # Ok::<(), larva_store::Error>(())
//! ```

use time::{Duration, OffsetDateTime};

/// Default number of candidates returned per query.
pub const DEFAULT_CLEANUP_LIMIT: u32 = 20;

/// Fluent query builder for [`Store::query_cleanup_candidates`](crate::Store::query_cleanup_candidates).
#[derive(Debug, Clone)]
pub struct CleanupQuery {
    /// Highest event identifier the server guarantees to hold.
    pub safe_delete_event_id: i64,
    /// Minimum age of an image, in days.
    pub retention_days: u32,
    /// Maximum number of results.
    pub limit: u32,
    /// Reference time for the retention window (defaults to now).
    pub now: Option<OffsetDateTime>,
}

impl CleanupQuery {
    /// Create a query bounded by the given watermark.
    pub fn new(safe_delete_event_id: i64) -> Self {
        Self {
            safe_delete_event_id,
            retention_days: 0,
            limit: DEFAULT_CLEANUP_LIMIT,
            now: None,
        }
    }

    /// Only include images older than this many days.
    pub fn retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Evaluate the retention window relative to `now` instead of the clock.
    pub fn at(mut self, now: OffsetDateTime) -> Self {
        self.now = Some(now);
        self
    }

    /// Latest capture time that is old enough to delete.
    pub fn cutoff(&self) -> OffsetDateTime {
        let now = self.now.unwrap_or_else(OffsetDateTime::now_utc);
        now - Duration::days(i64::from(self.retention_days))
    }

    /// Build the full SQL query and its parameters.
    pub(crate) fn build(&self) -> (String, [i64; 3]) {
        let sql = format!(
            "SELECT {} FROM captured_images
             WHERE local_exists = 1 AND event_id <= ?1 AND captured_at <= ?2
             ORDER BY captured_at ASC, id ASC
             LIMIT ?3",
            crate::store::IMAGE_COLUMNS
        );
        (
            sql,
            [
                self.safe_delete_event_id,
                self.cutoff().unix_timestamp(),
                i64::from(self.limit),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_query_defaults() {
        let query = CleanupQuery::new(5);
        assert_eq!(query.safe_delete_event_id, 5);
        assert_eq!(query.retention_days, 0);
        assert_eq!(query.limit, DEFAULT_CLEANUP_LIMIT);
        assert!(query.now.is_none());
    }

    #[test]
    fn test_cleanup_query_cutoff() {
        let now = OffsetDateTime::from_unix_timestamp(1_000_000).unwrap();
        let query = CleanupQuery::new(5).retention_days(2).at(now);
        assert_eq!(query.cutoff(), now - Duration::days(2));

        let zero = CleanupQuery::new(5).at(now);
        assert_eq!(zero.cutoff(), now);
    }

    #[test]
    fn test_cleanup_query_params() {
        let now = OffsetDateTime::from_unix_timestamp(1_000_000).unwrap();
        let (sql, params) = CleanupQuery::new(9).retention_days(1).limit(3).at(now).build();
        assert!(sql.contains("local_exists = 1"));
        assert!(sql.contains("ORDER BY captured_at ASC"));
        assert_eq!(params, [9, 1_000_000 - 86_400, 3]);
    }
}
