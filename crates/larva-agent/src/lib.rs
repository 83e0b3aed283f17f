//! Edge capture agent for SmartLarva devices.
//!
//! The agent runs four independent loops that coordinate only through the
//! local store:
//!
//! - **capture** takes a burst of images (and optionally a sensor reading)
//!   for the configured crate
//! - **sync** uploads event metadata, reading metadata and image payloads in
//!   small batches
//! - **heartbeat** reports the highest local event id and stores the
//!   safe-delete watermark the server answers with
//! - **cleanup** removes local payloads at or below the watermark once they
//!   leave the retention window
//!
//! # Configuration
//!
//! The agent reads configuration from `~/.config/larva/agent.toml`:
//!
//! ```toml
//! [device]
//! id = "device-001"
//!
//! [server]
//! base_url = "https://larva.example.com"
//!
//! [capture]
//! burst_size = 10
//! camera_backend = "libcamera"
//!
//! [crate]
//! id = 1
//! label = "crate_01"
//! started_at = "2025-02-01"
//! ```

pub mod agent;
pub mod capture;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod ids;
pub mod logging;
pub mod shutdown;
pub mod sync;
pub mod worker;

pub use agent::{Agent, AgentHandle, Backends, SHUTDOWN_GRACE};
pub use capture::{CaptureOutcome, CapturePipeline};
pub use cleanup::{CleanupEngine, CleanupReport};
pub use config::{Config, ConfigError, ValidationError};
pub use error::{Error, Result};
pub use heartbeat::HeartbeatTask;
pub use ids::IdAllocator;
pub use shutdown::Shutdown;
pub use sync::{SyncEngine, SyncReport};
pub use worker::{PeriodicTask, run_periodic};
