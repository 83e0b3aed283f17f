//! Error types for a single loop tick.

use std::path::PathBuf;

/// Agent errors.
///
/// Everything except [`Error::Config`] ends a single tick of a periodic
/// loop. Those are logged and the next tick runs on schedule.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    #[error("Store error: {0}")]
    Store(#[from] larva_store::Error),
    #[error("Camera error: {0}")]
    Camera(larva_core::Error),
    #[error("Sensor error: {0}")]
    Sensor(larva_core::Error),
    #[error("Uplink error: {0}")]
    Uplink(larva_core::Error),
    #[error("Failed to read {path}: {source}")]
    ReadImage {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{} sync step(s) failed:\n{}", .0.len(), format_step_errors(.0))]
    Sync(Vec<Error>),
}

fn format_step_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, Error>;
