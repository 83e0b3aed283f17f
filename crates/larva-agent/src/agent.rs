//! Agent assembly: builds the backends and runs the four loops.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use larva_core::{
    CameraBackend, Dht22Sensor, HttpUplink, LibcameraCamera, MockCamera, MockSensor,
    SensorBackend, Uplink,
};
use larva_store::Store;

use crate::capture::CapturePipeline;
use crate::cleanup::CleanupEngine;
use crate::config::{CameraKind, Config, SensorKind};
use crate::error::Result;
use crate::heartbeat::HeartbeatTask;
use crate::shutdown::Shutdown;
use crate::sync::SyncEngine;
use crate::worker::{PeriodicTask, run_periodic};

/// Time each loop gets to finish its current tick on shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The producer and uplink implementations the loops talk to.
pub struct Backends {
    pub camera: Arc<dyn CameraBackend>,
    pub sensor: Option<Arc<dyn SensorBackend>>,
    pub uplink: Arc<dyn Uplink>,
}

impl Backends {
    /// Select backends from configuration.
    pub fn from_config(config: &Config) -> larva_core::Result<Self> {
        let capture = &config.capture;
        let camera: Arc<dyn CameraBackend> = match capture.camera_backend {
            CameraKind::Mock => Arc::new(MockCamera::new(capture.width, capture.height)),
            CameraKind::Libcamera => Arc::new(LibcameraCamera::new(capture.width, capture.height)),
        };

        let sensor: Option<Arc<dyn SensorBackend>> = if config.sensor.enabled {
            match config.sensor.backend {
                SensorKind::Mock => Some(Arc::new(MockSensor::new())),
                SensorKind::Dht22 => {
                    let sensor = Dht22Sensor::new(&config.sensor.iio_device);
                    if !sensor.is_present() {
                        warn!(
                            "DHT22 device not found at {}, sensor reads will fail",
                            sensor.device_dir().display()
                        );
                    }
                    Some(Arc::new(sensor))
                }
            }
        } else {
            None
        };

        let uplink = HttpUplink::new(
            &config.server.base_url,
            &config.device.id,
            config.server.timeout(),
        )?;

        Ok(Self {
            camera,
            sensor,
            uplink: Arc::new(uplink),
        })
    }
}

/// A configured agent, ready to start.
pub struct Agent {
    config: Config,
    store: Arc<Store>,
    backends: Backends,
}

impl Agent {
    pub fn new(config: Config, store: Arc<Store>, backends: Backends) -> Self {
        Self {
            config,
            store,
            backends,
        }
    }

    /// Register the crate and spawn the loops.
    ///
    /// Must be called from within a tokio runtime. The capture loop is only
    /// started when capture is enabled; the other three always run.
    pub fn start(self) -> Result<AgentHandle> {
        let shutdown = Shutdown::new();
        let intervals = &self.config.intervals;
        let mut tasks = Vec::with_capacity(4);

        if self.config.capture.enabled {
            let crate_record = self.config.stored_crate()?;
            let crate_id = self.store.upsert_crate(&crate_record)?;
            info!(crate_id, label = %crate_record.label, "Capturing for crate");

            let mut pipeline = CapturePipeline::new(
                Arc::clone(&self.store),
                Arc::clone(&self.backends.camera),
                crate_id,
                &self.config.storage.image_dir,
            )?
            .burst_size(self.config.capture.burst_size)
            .camera_name(&self.config.capture.camera_name);
            if let Some(sensor) = &self.backends.sensor {
                pipeline = pipeline.with_sensor(Arc::clone(sensor));
            }
            tasks.push(spawn_loop(pipeline, intervals.capture_period(), &shutdown));
        } else {
            info!("Capture disabled");
        }

        let heartbeat = HeartbeatTask::new(Arc::clone(&self.store), Arc::clone(&self.backends.uplink));
        tasks.push(spawn_loop(heartbeat, intervals.heartbeat_period(), &shutdown));

        let sync = SyncEngine::new(
            Arc::clone(&self.store),
            Arc::clone(&self.backends.uplink),
            &self.config.device.id,
        );
        tasks.push(spawn_loop(sync, intervals.sync_period(), &shutdown));

        let cleanup = CleanupEngine::new(Arc::clone(&self.store), self.config.retention.days);
        tasks.push(spawn_loop(cleanup, intervals.cleanup_period(), &shutdown));

        info!("Agent started with {} loop(s)", tasks.len());
        Ok(AgentHandle { shutdown, tasks })
    }
}

fn spawn_loop<T>(task: T, period: Duration, shutdown: &Shutdown) -> (&'static str, JoinHandle<()>)
where
    T: PeriodicTask + 'static,
{
    let name = task.name();
    let stop_rx = shutdown.subscribe();
    let handle = tokio::spawn(async move {
        run_periodic(task, period, stop_rx).await;
    });
    (name, handle)
}

/// Handle to the running loops.
pub struct AgentHandle {
    shutdown: Shutdown,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl AgentHandle {
    /// Names of the running loops, in start order.
    pub fn loop_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Signal every loop to stop and wait for each to finish its tick.
    ///
    /// Loops are joined concurrently; one still busy after `grace` is
    /// aborted.
    pub async fn shutdown(self, grace: Duration) {
        info!("Stopping agent");
        self.shutdown.signal();

        let joins = self.tasks.into_iter().map(|(name, mut handle)| async move {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("{} loop ended abnormally: {}", name, e),
                Err(_) => {
                    warn!("{} loop did not stop within {}s, aborting", name, grace.as_secs());
                    handle.abort();
                }
            }
        });
        join_all(joins).await;
        info!("Agent stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrateConfig;
    use larva_core::MockUplink;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.device.id = "dev-1".to_string();
        config.server.base_url = "http://127.0.0.1:9".to_string();
        config.storage.image_dir = dir.path().join("images");
        config.capture.burst_size = 2;
        config.capture.width = 16;
        config.capture.height = 16;
        config.crate_info = Some(CrateConfig {
            id: Some(1),
            label: "A".to_string(),
            started_at: Some("2025-01-01".to_string()),
            ..Default::default()
        });
        config
    }

    fn mock_backends(uplink: Arc<MockUplink>) -> Backends {
        Backends {
            camera: Arc::new(MockCamera::new(16, 16)),
            sensor: Some(Arc::new(MockSensor::new())),
            uplink,
        }
    }

    #[test]
    fn test_backends_from_config() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        let backends = Backends::from_config(&config).unwrap();
        assert!(backends.sensor.is_none());

        config.sensor.enabled = true;
        let backends = Backends::from_config(&config).unwrap();
        assert!(backends.sensor.is_some());

        config.server.base_url = "ftp://nope".to_string();
        assert!(Backends::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_start_runs_first_ticks_and_stops() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let store = Arc::new(Store::open_in_memory().unwrap());
        let uplink = Arc::new(MockUplink::new());

        let agent = Agent::new(config, Arc::clone(&store), mock_backends(Arc::clone(&uplink)));
        let handle = agent.start().unwrap();
        assert_eq!(handle.loop_names(), vec!["capture", "heartbeat", "sync", "cleanup"]);

        // Every loop ticks immediately on start
        for _ in 0..100 {
            if store.get_event(1).unwrap().is_some() && !uplink.calls().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.shutdown(SHUTDOWN_GRACE).await;

        assert_eq!(store.get_crate(1).unwrap().unwrap().label, "A");
        assert_eq!(store.get_images_for_event(1).unwrap().len(), 2);
        assert!(store.get_reading(1).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_capture_disabled_needs_no_crate() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.capture.enabled = false;
        config.crate_info = None;
        let store = Arc::new(Store::open_in_memory().unwrap());

        let handle = Agent::new(config, store, mock_backends(Arc::new(MockUplink::new())))
            .start()
            .unwrap();
        assert_eq!(handle.loop_names(), vec!["heartbeat", "sync", "cleanup"]);
        handle.shutdown(SHUTDOWN_GRACE).await;
    }

    #[tokio::test]
    async fn test_capture_without_crate_is_config_error() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.crate_info = None;
        let store = Arc::new(Store::open_in_memory().unwrap());

        let result = Agent::new(config, store, mock_backends(Arc::new(MockUplink::new()))).start();
        assert!(matches!(result, Err(crate::error::Error::Config(_))));
    }
}
