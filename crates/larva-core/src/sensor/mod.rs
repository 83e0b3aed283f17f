//! Environmental sensor backends.
//!
//! - [`MockSensor`] returns plausible random values
//! - [`Dht22Sensor`] reads a DHT22 through the Linux IIO driver

mod iio;
mod mock;

use async_trait::async_trait;

use larva_types::SensorSample;

use crate::error::Result;

pub use iio::{DEFAULT_IIO_DEVICE, Dht22Sensor};
pub use mock::MockSensor;

/// A producer of environmental samples for a crate.
#[async_trait]
pub trait SensorBackend: Send + Sync {
    /// Take one sample for `crate_id`, to be stored as `reading_id`.
    async fn read(&self, crate_id: i64, reading_id: i64) -> Result<SensorSample>;
}

/// Round to two decimal places.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
