//! Database schema and migrations.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if version < SCHEMA_VERSION {
        migrate(conn, version)?;
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
///
/// Timestamps are unix seconds (UTC). Flags are 0/1 integers.
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- Crates: identifier supplied by configuration, never generated here
        CREATE TABLE IF NOT EXISTS crates (
            id INTEGER PRIMARY KEY,
            label TEXT NOT NULL,
            location TEXT,
            notes TEXT,
            created_at INTEGER NOT NULL,
            ended_at INTEGER
        );

        -- Capture events are kept forever as an audit trail
        CREATE TABLE IF NOT EXISTS capture_events (
            event_id INTEGER PRIMARY KEY,
            crate_id INTEGER NOT NULL REFERENCES crates(id),
            camera_name TEXT NOT NULL,
            captured_at INTEGER NOT NULL,
            burst_size INTEGER NOT NULL,
            uploaded INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_events_uploaded
            ON capture_events(uploaded, event_id);

        CREATE TABLE IF NOT EXISTS captured_images (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id INTEGER NOT NULL REFERENCES capture_events(event_id),
            image_index INTEGER NOT NULL,
            local_path TEXT NOT NULL,
            captured_at INTEGER NOT NULL,
            size_bytes INTEGER NOT NULL,
            sha256_hex TEXT NOT NULL,
            width_px INTEGER NOT NULL,
            height_px INTEGER NOT NULL,
            format TEXT NOT NULL,
            metadata_uploaded INTEGER NOT NULL DEFAULT 0,
            uploaded INTEGER NOT NULL DEFAULT 0,
            local_exists INTEGER NOT NULL DEFAULT 1,
            corrupted INTEGER NOT NULL DEFAULT 0,
            UNIQUE(event_id, image_index),
            CHECK (corrupted = 0 OR uploaded = 0)
        );
        CREATE INDEX IF NOT EXISTS idx_images_pending
            ON captured_images(metadata_uploaded, uploaded, corrupted, local_exists);
        CREATE INDEX IF NOT EXISTS idx_images_cleanup
            ON captured_images(local_exists, captured_at);

        CREATE TABLE IF NOT EXISTS sensor_readings (
            reading_id INTEGER PRIMARY KEY,
            crate_id INTEGER NOT NULL REFERENCES crates(id),
            recorded_at INTEGER NOT NULL,
            temperature_c REAL,
            humidity_pct REAL,
            uploaded INTEGER NOT NULL DEFAULT 0
        );

        -- Durable scalar state (e.g. the safe-delete watermark)
        CREATE TABLE IF NOT EXISTS process_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );
        "#,
    )?;

    Ok(())
}

/// Run migrations from old_version to current.
fn migrate(conn: &Connection, old_version: i32) -> Result<()> {
    // if old_version < 2 { migrate_to_v2(conn)?; }
    let _ = old_version;
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "crates",
            "capture_events",
            "captured_images",
            "sensor_readings",
            "process_state",
            "schema_version",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn test_schema_version_tracking() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 0);

        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);

        // Re-running is a no-op
        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_corrupted_and_uploaded_are_exclusive() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO crates (id, label, created_at) VALUES (1, 'A', 0);
             INSERT INTO capture_events (event_id, crate_id, camera_name, captured_at, burst_size)
                VALUES (1, 1, 'camera_0', 0, 1);",
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO captured_images (event_id, image_index, local_path, captured_at,
             size_bytes, sha256_hex, width_px, height_px, format, uploaded, corrupted)
             VALUES (1, 0, '/tmp/x.jpg', 0, 1, 'aa', 1, 1, 'jpg', 1, 1)",
            [],
        );
        assert!(result.is_err());
    }
}
