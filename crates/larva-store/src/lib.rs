//! Durable local capture store for the SmartLarva edge agent.
//!
//! This crate is the single source of truth for what a device has captured,
//! uploaded and deleted. Four independent loops share one [`Store`]:
//!
//! - capture inserts crates, events, images and sensor readings
//! - sync reads unsynced rows and advances their upload flags
//! - heartbeat records the server's safe-delete watermark
//! - cleanup reads the watermark and clears `local_exists` on deleted payloads
//!
//! Every call is atomic with respect to the others, and flag transitions are
//! idempotent.
//!
//! # Example
//!
//! ```no_run
//! use larva_store::{EntityKind, Store};
//!
//! let store = Store::open(larva_store::default_db_path())?;
//! let next_event = store.max_id(EntityKind::Event)?.unwrap_or(0) + 1;
//! let pending = store.get_unsynced_events(5)?;
//! # Ok::<(), larva_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{
    EntityKind, NewEvent, NewImage, NewReading, StoreStats, StoredCrate, StoredEvent, StoredImage,
    StoredReading,
};
pub use queries::{CleanupQuery, DEFAULT_CLEANUP_LIMIT};
pub use store::{Store, WATERMARK_KEY};

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/larva/edge.db`
/// - macOS: `~/Library/Application Support/larva/edge.db`
/// - Windows: `C:\Users\<user>\AppData\Local\larva\edge.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("larva")
        .join("edge.db")
}
