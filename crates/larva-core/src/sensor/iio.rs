//! DHT22 temperature/humidity sensor through the Linux IIO subsystem.
//!
//! With the `dht11` kernel driver bound (`dtoverlay=dht11` on a Raspberry
//! Pi, which also handles the DHT22), the sensor appears as an IIO device
//! exposing two sysfs channels in milli-units:
//!
//! - `in_temp_input` (milli °C)
//! - `in_humidityrelative_input` (milli %RH)
//!
//! The driver often answers `EIO` when a transfer is garbled, so each read is
//! retried a few times before giving up.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::debug;

use larva_types::SensorSample;

use super::{SensorBackend, round2};
use crate::error::{Error, Result};

/// Default sysfs directory of the first IIO device.
pub const DEFAULT_IIO_DEVICE: &str = "/sys/bus/iio/devices/iio:device0";

const TEMPERATURE_CHANNEL: &str = "in_temp_input";
const HUMIDITY_CHANNEL: &str = "in_humidityrelative_input";

/// Measurement range of the DHT22.
const TEMPERATURE_RANGE: std::ops::RangeInclusive<f64> = -40.0..=80.0;
const HUMIDITY_RANGE: std::ops::RangeInclusive<f64> = 0.0..=100.0;

/// A DHT22 read through IIO sysfs files.
#[derive(Debug, Clone)]
pub struct Dht22Sensor {
    device_dir: PathBuf,
    attempts: u32,
    retry_delay: Duration,
}

impl Dht22Sensor {
    /// Create a sensor reading from the given IIO device directory.
    pub fn new(device_dir: impl Into<PathBuf>) -> Self {
        Self {
            device_dir: device_dir.into(),
            attempts: 3,
            // The DHT22 cannot be sampled faster than every two seconds
            retry_delay: Duration::from_secs(2),
        }
    }

    /// Set how many times a read is attempted and the pause between tries.
    pub fn with_retry(mut self, attempts: u32, retry_delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// The IIO device directory.
    pub fn device_dir(&self) -> &Path {
        &self.device_dir
    }

    /// Whether the temperature channel exists.
    pub fn is_present(&self) -> bool {
        self.device_dir.join(TEMPERATURE_CHANNEL).exists()
    }

    async fn read_channel(&self, channel: &str) -> Result<f64> {
        let path = self.device_dir.join(channel);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::ReadFailed(format!("{}: {}", path.display(), e)))?;
        let milli: f64 = raw.trim().parse().map_err(|_| {
            Error::ReadFailed(format!("{}: unexpected value {:?}", path.display(), raw.trim()))
        })?;
        Ok(milli / 1000.0)
    }

    async fn read_once(&self) -> Result<(f64, f64)> {
        let temperature = self.read_channel(TEMPERATURE_CHANNEL).await?;
        let humidity = self.read_channel(HUMIDITY_CHANNEL).await?;

        if !TEMPERATURE_RANGE.contains(&temperature) {
            return Err(Error::ReadFailed(format!(
                "temperature {temperature} °C out of range"
            )));
        }
        if !HUMIDITY_RANGE.contains(&humidity) {
            return Err(Error::ReadFailed(format!(
                "humidity {humidity} % out of range"
            )));
        }

        Ok((round2(temperature), round2(humidity)))
    }
}

impl Default for Dht22Sensor {
    fn default() -> Self {
        Self::new(DEFAULT_IIO_DEVICE)
    }
}

#[async_trait]
impl SensorBackend for Dht22Sensor {
    async fn read(&self, crate_id: i64, reading_id: i64) -> Result<SensorSample> {
        let mut attempt = 1;
        loop {
            match self.read_once().await {
                Ok((temperature, humidity)) => {
                    return Ok(SensorSample {
                        temperature_c: Some(temperature),
                        humidity_pct: Some(humidity),
                        recorded_at: OffsetDateTime::now_utc(),
                    });
                }
                Err(e) if attempt < self.attempts => {
                    debug!(
                        crate_id,
                        reading_id, "DHT22 read attempt {} failed: {}", attempt, e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
