//! Simulated temperature/humidity sensor.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use rand::Rng;
use time::OffsetDateTime;
use tracing::trace;

use larva_types::SensorSample;

use super::{SensorBackend, round2};
use crate::error::{Error, Result};

/// A sensor returning uniformly random values in a comfortable range:
/// 18-25 °C and 40-70 %RH, rounded to two decimals.
#[derive(Debug, Default)]
pub struct MockSensor {
    should_fail: AtomicBool,
    read_count: AtomicU32,
}

impl MockSensor {
    /// Create a new mock sensor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following read fail with [`Error::ReadFailed`].
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Number of reads attempted so far.
    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SensorBackend for MockSensor {
    async fn read(&self, crate_id: i64, reading_id: i64) -> Result<SensorSample> {
        self.read_count.fetch_add(1, Ordering::Relaxed);

        if self.should_fail.load(Ordering::Relaxed) {
            return Err(Error::ReadFailed("mock sensor failure".to_string()));
        }

        let mut rng = rand::rng();
        let temperature = round2(rng.random_range(18.0..=25.0));
        let humidity = round2(rng.random_range(40.0..=70.0));
        trace!(crate_id, reading_id, temperature, humidity, "Mock sensor sample");

        Ok(SensorSample {
            temperature_c: Some(temperature),
            humidity_pct: Some(humidity),
            recorded_at: OffsetDateTime::now_utc(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_values_in_range() {
        let sensor = MockSensor::new();
        for id in 1..=50 {
            let sample = sensor.read(1, id).await.unwrap();
            let t = sample.temperature_c.unwrap();
            let h = sample.humidity_pct.unwrap();
            assert!((18.0..=25.0).contains(&t), "temperature {t}");
            assert!((40.0..=70.0).contains(&h), "humidity {h}");
            assert_eq!(round2(t), t);
            assert_eq!(round2(h), h);
        }
        assert_eq!(sensor.read_count(), 50);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let sensor = MockSensor::new();
        sensor.set_should_fail(true);
        assert!(matches!(sensor.read(1, 1).await, Err(Error::ReadFailed(_))));
        sensor.set_should_fail(false);
        assert!(sensor.read(1, 2).await.is_ok());
    }
}
