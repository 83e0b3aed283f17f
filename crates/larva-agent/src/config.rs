//! Agent configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};

use larva_store::StoredCrate;

/// Agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device identity.
    pub device: DeviceConfig,
    /// Server connection.
    pub server: ServerConfig,
    /// Local storage locations.
    pub storage: StorageConfig,
    /// Camera capture settings.
    pub capture: CaptureConfig,
    /// Environmental sensor settings.
    pub sensor: SensorConfig,
    /// Loop periods.
    pub intervals: IntervalConfig,
    /// Local retention policy.
    pub retention: RetentionConfig,
    /// Log output.
    pub logging: LoggingConfig,
    /// The crate captures are attributed to.
    #[serde(rename = "crate", skip_serializing_if = "Option::is_none")]
    pub crate_info: Option<CrateConfig>,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    ///
    /// This checks:
    /// - Device identity and server URL are present
    /// - The server URL is http(s) and the timeout is non-zero
    /// - Storage paths are not empty
    /// - Burst size is 1-100 and every loop interval is at least one second
    /// - When capture is enabled, the crate has an id, a label and a
    ///   parseable start date
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.device.validate());
        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.capture.validate());
        errors.extend(self.sensor.validate());
        errors.extend(self.intervals.validate());

        if self.capture.enabled {
            match &self.crate_info {
                Some(crate_info) => errors.extend(crate_info.validate()),
                None => errors.push(ValidationError {
                    field: "crate".to_string(),
                    message: "crate section is required when capture is enabled".to_string(),
                }),
            }
        } else if let Some(crate_info) = &self.crate_info {
            errors.extend(crate_info.validate());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Create the directories the agent writes into.
    pub fn ensure_paths(&self) -> Result<(), ConfigError> {
        let mut targets: Vec<&Path> = vec![self.storage.image_dir.as_path()];
        targets.extend(self.storage.db_path.parent());
        if let Some(file) = &self.logging.file {
            targets.extend(file.parent());
        }

        for dir in targets {
            if dir.as_os_str().is_empty() {
                continue;
            }
            std::fs::create_dir_all(dir).map_err(|e| ConfigError::Write {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// The crate record to register at startup.
    pub fn stored_crate(&self) -> Result<StoredCrate, ConfigError> {
        let crate_info = self.crate_info.as_ref().ok_or_else(|| {
            ConfigError::Validation(vec![ValidationError {
                field: "crate".to_string(),
                message: "crate section is missing".to_string(),
            }])
        })?;
        crate_info.to_stored()
    }
}

/// Device identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Identifier reported to the server.
    pub id: String,
}

impl DeviceConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.id.trim().is_empty() {
            errors.push(ValidationError {
                field: "device.id".to_string(),
                message: "device id is required".to_string(),
            });
        }
        errors
    }
}

/// Server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL (e.g., "https://larva.example.com").
    pub base_url: String,
    /// Timeout for every request, in seconds.
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.base_url.trim().is_empty() {
            errors.push(ValidationError {
                field: "server.base_url".to_string(),
                message: "server base URL is required".to_string(),
            });
        } else if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://")
        {
            errors.push(ValidationError {
                field: "server.base_url".to_string(),
                message: format!(
                    "invalid URL '{}': must start with http:// or https://",
                    self.base_url
                ),
            });
        }

        if self.timeout_secs == 0 {
            errors.push(ValidationError {
                field: "server.timeout_secs".to_string(),
                message: "timeout must be at least 1 second".to_string(),
            });
        }

        errors
    }
}

/// Storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub db_path: PathBuf,
    /// Directory captured images are written to.
    pub image_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: larva_store::default_db_path(),
            image_dir: default_image_dir(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.db_path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.db_path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }
        if self.image_dir.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.image_dir".to_string(),
                message: "image directory cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Camera backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraKind {
    /// Synthetic frames.
    #[default]
    Mock,
    /// `libcamera-still` on a Raspberry Pi.
    Libcamera,
}

/// Maximum number of images per burst.
pub const MAX_BURST_SIZE: u32 = 100;

/// Camera capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Whether the capture loop runs at all.
    pub enabled: bool,
    /// Images requested per capture event.
    pub burst_size: u32,
    pub camera_backend: CameraKind,
    /// Name recorded on every event.
    pub camera_name: String,
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            burst_size: 10,
            camera_backend: CameraKind::Mock,
            camera_name: "camera_0".to_string(),
            width: 640,
            height: 480,
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.burst_size == 0 || self.burst_size > MAX_BURST_SIZE {
            errors.push(ValidationError {
                field: "capture.burst_size".to_string(),
                message: format!(
                    "burst size {} is out of range (1-{})",
                    self.burst_size, MAX_BURST_SIZE
                ),
            });
        }
        if self.camera_name.trim().is_empty() {
            errors.push(ValidationError {
                field: "capture.camera_name".to_string(),
                message: "camera name cannot be empty".to_string(),
            });
        }
        if self.width == 0 || self.height == 0 {
            errors.push(ValidationError {
                field: "capture.width".to_string(),
                message: format!("invalid image size {}x{}", self.width, self.height),
            });
        }

        errors
    }
}

/// Sensor backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// Random plausible values.
    #[default]
    Mock,
    /// DHT22 through the Linux IIO driver.
    Dht22,
}

/// Environmental sensor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Take a reading with every capture event.
    pub enabled: bool,
    pub backend: SensorKind,
    /// IIO device directory for the DHT22.
    pub iio_device: PathBuf,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: SensorKind::Mock,
            iio_device: PathBuf::from(larva_core::sensor::DEFAULT_IIO_DEVICE),
        }
    }
}

impl SensorConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.enabled
            && self.backend == SensorKind::Dht22
            && self.iio_device.as_os_str().is_empty()
        {
            errors.push(ValidationError {
                field: "sensor.iio_device".to_string(),
                message: "IIO device path cannot be empty".to_string(),
            });
        }
        errors
    }
}

/// Loop periods in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    pub capture: u64,
    pub heartbeat: u64,
    pub sync: u64,
    pub cleanup: u64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            capture: 60,
            heartbeat: 300,
            sync: 120,
            cleanup: 3600,
        }
    }
}

impl IntervalConfig {
    pub fn capture_period(&self) -> Duration {
        Duration::from_secs(self.capture)
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.heartbeat)
    }

    pub fn sync_period(&self) -> Duration {
        Duration::from_secs(self.sync)
    }

    pub fn cleanup_period(&self) -> Duration {
        Duration::from_secs(self.cleanup)
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        [
            ("capture", self.capture),
            ("heartbeat", self.heartbeat),
            ("sync", self.sync),
            ("cleanup", self.cleanup),
        ]
        .into_iter()
        .filter(|(_, secs)| *secs == 0)
        .map(|(name, _)| ValidationError {
            field: format!("intervals.{}", name),
            message: "interval must be at least 1 second".to_string(),
        })
        .collect()
    }
}

/// Local retention policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Minimum age in days before an image may be deleted locally.
    pub days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { days: 30 }
    }
}

/// Log output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write logs to this file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Crate identity, registered once at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrateConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
}

impl CrateConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.id.is_none() {
            errors.push(ValidationError {
                field: "crate.id".to_string(),
                message: "crate id is required".to_string(),
            });
        }
        if self.label.trim().is_empty() {
            errors.push(ValidationError {
                field: "crate.label".to_string(),
                message: "crate label is required".to_string(),
            });
        }
        match self.started_at.as_deref() {
            None => errors.push(ValidationError {
                field: "crate.started_at".to_string(),
                message: "crate start date is required".to_string(),
            }),
            Some(value) if parse_timestamp(value).is_none() => errors.push(ValidationError {
                field: "crate.started_at".to_string(),
                message: format!("invalid date '{}': expected RFC 3339 or YYYY-MM-DD", value),
            }),
            Some(_) => {}
        }
        if let Some(value) = self.ended_at.as_deref()
            && parse_timestamp(value).is_none()
        {
            errors.push(ValidationError {
                field: "crate.ended_at".to_string(),
                message: format!("invalid date '{}': expected RFC 3339 or YYYY-MM-DD", value),
            });
        }

        errors
    }

    /// Convert to a store record.
    pub fn to_stored(&self) -> Result<StoredCrate, ConfigError> {
        let errors = self.validate();
        match (self.id, self.started_at.as_deref().and_then(parse_timestamp)) {
            (Some(id), Some(created_at)) if errors.is_empty() => Ok(StoredCrate {
                id,
                label: self.label.clone(),
                location: self.location.clone(),
                notes: self.notes.clone(),
                created_at,
                ended_at: self.ended_at.as_deref().and_then(parse_timestamp),
            }),
            _ => Err(ConfigError::Validation(errors)),
        }
    }
}

/// Parse an RFC 3339 timestamp or a `YYYY-MM-DD` date (midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    let value = value.trim();
    if let Ok(ts) = OffsetDateTime::parse(value, &Rfc3339) {
        return Some(ts);
    }

    let format = time::format_description::parse("[year]-[month]-[day]").ok()?;
    Date::parse(value, &format)
        .ok()
        .map(|date| date.midnight().assume_utc())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.base_url` or `crate.label`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("larva")
        .join("agent.toml")
}

/// Default image directory, next to the default database.
pub fn default_image_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("larva")
        .join("images")
}
