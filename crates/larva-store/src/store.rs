//! Main store implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use time::OffsetDateTime;
use tracing::{debug, info};

use larva_types::ImageFormat;

use crate::error::{Error, Result};
use crate::models::{
    EntityKind, NewEvent, NewImage, NewReading, StoreStats, StoredCrate, StoredEvent, StoredImage,
    StoredReading,
};
use crate::queries::CleanupQuery;
use crate::schema;

/// Process-state key holding the server's safe-delete watermark.
pub const WATERMARK_KEY: &str = "delete_safe_up_to_event_id";

pub(crate) const IMAGE_COLUMNS: &str = "id, event_id, image_index, local_path, captured_at, \
     size_bytes, sha256_hex, width_px, height_px, format, metadata_uploaded, uploaded, \
     local_exists, corrupted";

const EVENT_COLUMNS: &str = "event_id, crate_id, camera_name, captured_at, burst_size, uploaded";

const READING_COLUMNS: &str =
    "reading_id, crate_id, recorded_at, temperature_c, humidity_pct, uploaded";

/// SQLite-based store for captured events, images and sensor readings.
///
/// Every call takes the connection lock for its whole duration, so each
/// mutating call is a single atomic unit even when several loops share the
/// store through an `Arc`. The lock is never exposed and never held across
/// an `.await` by callers, since all methods are synchronous.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-call cannot leave a half-applied statement behind, so a
        // poisoned lock still guards a consistent connection.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Crate operations
impl Store {
    /// Register a crate if it is not known yet.
    ///
    /// An existing crate with the same identifier is left untouched and its
    /// identifier returned.
    pub fn upsert_crate(&self, record: &StoredCrate) -> Result<i64> {
        let inserted = self.conn().execute(
            "INSERT INTO crates (id, label, location, notes, created_at, ended_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO NOTHING",
            params![
                record.id,
                record.label,
                record.location,
                record.notes,
                record.created_at.unix_timestamp(),
                record.ended_at.map(|t| t.unix_timestamp()),
            ],
        )?;

        if inserted > 0 {
            info!("Registered crate {} ({})", record.id, record.label);
        } else {
            debug!("Crate {} already registered", record.id);
        }

        Ok(record.id)
    }

    /// Get a crate by ID.
    pub fn get_crate(&self, crate_id: i64) -> Result<Option<StoredCrate>> {
        let crate_row = self
            .conn()
            .query_row(
                "SELECT id, label, location, notes, created_at, ended_at FROM crates WHERE id = ?",
                [crate_id],
                |row| {
                    Ok(StoredCrate {
                        id: row.get(0)?,
                        label: row.get(1)?,
                        location: row.get(2)?,
                        notes: row.get(3)?,
                        created_at: timestamp_at(row, 4)?,
                        ended_at: optional_timestamp_at(row, 5)?,
                    })
                },
            )
            .optional()?;

        Ok(crate_row)
    }
}

// Insert operations
impl Store {
    /// Insert a capture event.
    pub fn insert_event(&self, event: &NewEvent) -> Result<()> {
        insert_event_row(&self.conn(), event)
    }

    /// Insert an image row, returning its row ID.
    pub fn insert_image(&self, image: &NewImage) -> Result<i64> {
        insert_image_row(&self.conn(), image)
    }

    /// Insert an event together with all of its images in one transaction,
    /// returning the image row IDs in the order given.
    ///
    /// Readers never observe the event without its images. On error nothing
    /// is written.
    pub fn insert_capture(&self, event: &NewEvent, images: &[NewImage]) -> Result<Vec<i64>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        insert_event_row(&tx, event)?;
        let mut image_ids = Vec::with_capacity(images.len());
        for image in images {
            if image.event_id != event.event_id {
                return Err(Error::Integrity {
                    entity: "captured_images",
                    detail: format!(
                        "image {} belongs to event {}, not {}",
                        image.image_index, image.event_id, event.event_id
                    ),
                });
            }
            image_ids.push(insert_image_row(&tx, image)?);
        }

        tx.commit()?;
        Ok(image_ids)
    }

    /// Insert a sensor reading.
    pub fn insert_sensor_reading(&self, reading: &NewReading) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO sensor_readings (reading_id, crate_id, recorded_at, temperature_c,
                 humidity_pct)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    reading.reading_id,
                    reading.crate_id,
                    reading.recorded_at.unix_timestamp(),
                    reading.temperature_c,
                    reading.humidity_pct,
                ],
            )
            .map_err(|e| Error::from_insert("sensor_readings", e))?;
        Ok(())
    }
}

// Read operations
impl Store {
    /// Get a capture event by ID.
    pub fn get_event(&self, event_id: i64) -> Result<Option<StoredEvent>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM capture_events WHERE event_id = ?");
        Ok(self
            .conn()
            .query_row(&sql, [event_id], map_event)
            .optional()?)
    }

    /// Get an image by row ID.
    pub fn get_image(&self, image_id: i64) -> Result<Option<StoredImage>> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM captured_images WHERE id = ?");
        Ok(self
            .conn()
            .query_row(&sql, [image_id], map_image)
            .optional()?)
    }

    /// Get a sensor reading by ID.
    pub fn get_reading(&self, reading_id: i64) -> Result<Option<StoredReading>> {
        let sql = format!("SELECT {READING_COLUMNS} FROM sensor_readings WHERE reading_id = ?");
        Ok(self
            .conn()
            .query_row(&sql, [reading_id], map_reading)
            .optional()?)
    }

    /// All images of an event, in burst order.
    pub fn get_images_for_event(&self, event_id: i64) -> Result<Vec<StoredImage>> {
        let sql = format!(
            "SELECT {IMAGE_COLUMNS} FROM captured_images WHERE event_id = ? ORDER BY image_index"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let images = stmt
            .query_map([event_id], map_image)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(images)
    }

    /// Events whose metadata has not been uploaded, oldest first.
    pub fn get_unsynced_events(&self, limit: u32) -> Result<Vec<StoredEvent>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM capture_events WHERE uploaded = 0
             ORDER BY event_id ASC LIMIT ?"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map([limit], map_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Images ready for a binary upload, oldest first.
    ///
    /// Only images whose metadata is already uploaded, that are neither
    /// uploaded nor corrupted, and whose payload is still on disk qualify.
    pub fn get_unsynced_images(&self, limit: u32) -> Result<Vec<StoredImage>> {
        let sql = format!(
            "SELECT {IMAGE_COLUMNS} FROM captured_images
             WHERE metadata_uploaded = 1 AND uploaded = 0 AND corrupted = 0 AND local_exists = 1
             ORDER BY event_id ASC, image_index ASC LIMIT ?"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let images = stmt
            .query_map([limit], map_image)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(images)
    }

    /// Sensor readings not yet uploaded, oldest first.
    pub fn get_unsynced_readings(&self, limit: u32) -> Result<Vec<StoredReading>> {
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM sensor_readings WHERE uploaded = 0
             ORDER BY reading_id ASC LIMIT ?"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let readings = stmt
            .query_map([limit], map_reading)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(readings)
    }

    /// Highest identifier allocated so far, or `None` for an empty table.
    pub fn max_id(&self, kind: EntityKind) -> Result<Option<i64>> {
        let sql = match kind {
            EntityKind::Event => "SELECT MAX(event_id) FROM capture_events",
            EntityKind::Reading => "SELECT MAX(reading_id) FROM sensor_readings",
        };
        let max: Option<i64> = self.conn().query_row(sql, [], |row| row.get(0))?;
        Ok(max)
    }
}

// Upload state transitions. All of them are idempotent: marking a row that
// has already transitioned changes nothing and returns `false` / `0`.
impl Store {
    /// Mark an event's metadata as uploaded.
    pub fn mark_event_uploaded(&self, event_id: i64) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE capture_events SET uploaded = 1 WHERE event_id = ? AND uploaded = 0",
            [event_id],
        )?;
        Ok(changed > 0)
    }

    /// Mark the metadata of every image of an event as uploaded.
    pub fn mark_image_metadata_uploaded(&self, event_id: i64) -> Result<usize> {
        let changed = self.conn().execute(
            "UPDATE captured_images SET metadata_uploaded = 1
             WHERE event_id = ? AND metadata_uploaded = 0",
            [event_id],
        )?;
        Ok(changed)
    }

    /// Mark a metadata batch as uploaded in one transaction.
    ///
    /// `image_ids` must be exactly the image rows that were sent with the
    /// events; images of those events that were not in the batch keep
    /// `metadata_uploaded = 0`. Returns the number of events that
    /// transitioned.
    pub fn mark_events_synced(&self, event_ids: &[i64], image_ids: &[i64]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
            let mut mark_event = tx.prepare(
                "UPDATE capture_events SET uploaded = 1 WHERE event_id = ? AND uploaded = 0",
            )?;
            let mut mark_image = tx.prepare(
                "UPDATE captured_images SET metadata_uploaded = 1
                 WHERE id = ? AND metadata_uploaded = 0",
            )?;
            for event_id in event_ids {
                changed += mark_event.execute([event_id])?;
            }
            for image_id in image_ids {
                mark_image.execute([image_id])?;
            }
        }
        tx.commit()?;

        debug!(
            "Marked {} of {} events synced ({} images)",
            changed,
            event_ids.len(),
            image_ids.len()
        );
        Ok(changed)
    }

    /// Mark an image's binary payload as uploaded.
    ///
    /// Has no effect on a corrupted image.
    pub fn mark_image_uploaded(&self, image_id: i64) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE captured_images SET uploaded = 1
             WHERE id = ? AND uploaded = 0 AND corrupted = 0",
            [image_id],
        )?;
        Ok(changed > 0)
    }

    /// Permanently abandon the binary upload of an image.
    ///
    /// Has no effect on an image that is already uploaded.
    pub fn mark_image_corrupted(&self, image_id: i64) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE captured_images SET corrupted = 1
             WHERE id = ? AND corrupted = 0 AND uploaded = 0",
            [image_id],
        )?;
        Ok(changed > 0)
    }

    /// Record that an image's payload is no longer on disk.
    pub fn mark_image_deleted(&self, image_id: i64) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE captured_images SET local_exists = 0 WHERE id = ? AND local_exists = 1",
            [image_id],
        )?;
        Ok(changed > 0)
    }

    /// Mark a sensor reading as uploaded.
    pub fn mark_reading_uploaded(&self, reading_id: i64) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE sensor_readings SET uploaded = 1 WHERE reading_id = ? AND uploaded = 0",
            [reading_id],
        )?;
        Ok(changed > 0)
    }

    /// Mark a batch of sensor readings as uploaded in one transaction.
    pub fn mark_readings_uploaded(&self, reading_ids: &[i64]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE sensor_readings SET uploaded = 1 WHERE reading_id = ? AND uploaded = 0",
            )?;
            for reading_id in reading_ids {
                changed += stmt.execute([reading_id])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }
}

// Cleanup
impl Store {
    /// Images eligible for payload deletion.
    ///
    /// See [`CleanupQuery`] for the selection rules.
    pub fn get_cleanup_candidates(
        &self,
        safe_delete_event_id: i64,
        retention_days: u32,
        limit: u32,
    ) -> Result<Vec<StoredImage>> {
        let query = CleanupQuery::new(safe_delete_event_id)
            .retention_days(retention_days)
            .limit(limit);
        self.query_cleanup_candidates(&query)
    }

    /// Run a cleanup candidate query.
    pub fn query_cleanup_candidates(&self, query: &CleanupQuery) -> Result<Vec<StoredImage>> {
        let (sql, params) = query.build();
        debug!("Executing query: {}", sql);

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let images = stmt
            .query_map(params, map_image)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(images)
    }
}

// Process state
impl Store {
    /// Read a persisted scalar. `None` means the key was never set.
    pub fn get_state_value(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM process_state WHERE key = ?",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Persist a scalar, replacing any previous value.
    pub fn set_state_value(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO process_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, OffsetDateTime::now_utc().unix_timestamp()],
        )?;
        Ok(())
    }

    /// The last safe-delete watermark received from the server.
    pub fn get_watermark(&self) -> Result<Option<i64>> {
        match self.get_state_value(WATERMARK_KEY)? {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| Error::InvalidState {
                    key: WATERMARK_KEY.to_string(),
                    value,
                }),
        }
    }

    /// Store a safe-delete watermark verbatim.
    pub fn set_watermark(&self, event_id: i64) -> Result<()> {
        self.set_state_value(WATERMARK_KEY, &event_id.to_string())
    }
}

// Statistics
impl Store {
    /// Summarise the upload and cleanup backlog.
    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = self.conn().query_row(
            "SELECT
                (SELECT COUNT(*) FROM capture_events),
                (SELECT COUNT(*) FROM capture_events WHERE uploaded = 0),
                (SELECT COUNT(*) FROM captured_images),
                (SELECT COUNT(*) FROM captured_images WHERE metadata_uploaded = 0),
                (SELECT COUNT(*) FROM captured_images
                    WHERE metadata_uploaded = 1 AND uploaded = 0 AND corrupted = 0
                    AND local_exists = 1),
                (SELECT COUNT(*) FROM captured_images WHERE uploaded = 1),
                (SELECT COUNT(*) FROM captured_images WHERE corrupted = 1),
                (SELECT COUNT(*) FROM captured_images WHERE local_exists = 0),
                (SELECT COUNT(*) FROM sensor_readings),
                (SELECT COUNT(*) FROM sensor_readings WHERE uploaded = 0)",
            [],
            |row| {
                Ok(StoreStats {
                    events_total: row.get::<_, i64>(0)? as u64,
                    events_pending: row.get::<_, i64>(1)? as u64,
                    images_total: row.get::<_, i64>(2)? as u64,
                    images_metadata_pending: row.get::<_, i64>(3)? as u64,
                    images_binary_pending: row.get::<_, i64>(4)? as u64,
                    images_uploaded: row.get::<_, i64>(5)? as u64,
                    images_corrupted: row.get::<_, i64>(6)? as u64,
                    images_deleted: row.get::<_, i64>(7)? as u64,
                    readings_total: row.get::<_, i64>(8)? as u64,
                    readings_pending: row.get::<_, i64>(9)? as u64,
                    watermark: None,
                })
            },
        )?;

        stats.watermark = self.get_watermark()?;
        Ok(stats)
    }
}

fn insert_event_row(conn: &Connection, event: &NewEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO capture_events (event_id, crate_id, camera_name, captured_at, burst_size)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.event_id,
            event.crate_id,
            event.camera_name,
            event.captured_at.unix_timestamp(),
            event.burst_size,
        ],
    )
    .map_err(|e| Error::from_insert("capture_events", e))?;
    Ok(())
}

fn insert_image_row(conn: &Connection, image: &NewImage) -> Result<i64> {
    conn.execute(
        "INSERT INTO captured_images (event_id, image_index, local_path, captured_at,
         size_bytes, sha256_hex, width_px, height_px, format)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            image.event_id,
            image.image_index,
            image.local_path.to_string_lossy(),
            image.captured_at.unix_timestamp(),
            image.size_bytes as i64,
            image.checksum_hex,
            image.width,
            image.height,
            image.format.as_tag(),
        ],
    )
    .map_err(|e| Error::from_insert("captured_images", e))?;
    Ok(conn.last_insert_rowid())
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let ts: i64 = row.get(idx)?;
    OffsetDateTime::from_unix_timestamp(ts)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn optional_timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<OffsetDateTime>> {
    match row.get::<_, Option<i64>>(idx)? {
        None => Ok(None),
        Some(_) => timestamp_at(row, idx).map(Some),
    }
}

fn map_event(row: &Row<'_>) -> rusqlite::Result<StoredEvent> {
    Ok(StoredEvent {
        event_id: row.get(0)?,
        crate_id: row.get(1)?,
        camera_name: row.get(2)?,
        captured_at: timestamp_at(row, 3)?,
        burst_size: row.get(4)?,
        uploaded: row.get(5)?,
    })
}

fn map_image(row: &Row<'_>) -> rusqlite::Result<StoredImage> {
    let format: ImageFormat = row
        .get::<_, String>(9)?
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?;

    Ok(StoredImage {
        id: row.get(0)?,
        event_id: row.get(1)?,
        image_index: row.get(2)?,
        local_path: PathBuf::from(row.get::<_, String>(3)?),
        captured_at: timestamp_at(row, 4)?,
        size_bytes: row.get::<_, i64>(5)? as u64,
        checksum_hex: row.get(6)?,
        width: row.get(7)?,
        height: row.get(8)?,
        format,
        metadata_uploaded: row.get(10)?,
        uploaded: row.get(11)?,
        local_exists: row.get(12)?,
        corrupted: row.get(13)?,
    })
}

fn map_reading(row: &Row<'_>) -> rusqlite::Result<StoredReading> {
    Ok(StoredReading {
        reading_id: row.get(0)?,
        crate_id: row.get(1)?,
        recorded_at: timestamp_at(row, 2)?,
        temperature_c: row.get(3)?,
        humidity_pct: row.get(4)?,
        uploaded: row.get(5)?,
    })
}
