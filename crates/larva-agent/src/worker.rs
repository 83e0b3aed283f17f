//! Periodic loop driver shared by the capture, heartbeat, sync and cleanup
//! engines.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::Result;

/// One unit of periodic work.
#[async_trait]
pub trait PeriodicTask: Send {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Run one tick to completion.
    async fn tick(&mut self) -> Result<()>;
}

/// Run `task` every `period` until the stop signal is raised.
///
/// The first tick runs immediately. A tick is never interrupted: the stop
/// signal is checked before each tick and wakes the loop early only while it
/// sleeps. Failed ticks are logged with damping so a persistent outage does
/// not flood the log. Returns the task once stopped.
pub async fn run_periodic<T: PeriodicTask>(
    mut task: T,
    period: Duration,
    mut stop_rx: watch::Receiver<bool>,
) -> T {
    let name = task.name();
    info!("Starting {} loop (interval: {}s)", name, period.as_secs());

    let mut consecutive_failures = 0u32;

    loop {
        if *stop_rx.borrow_and_update() {
            break;
        }

        match task.tick().await {
            Ok(()) => {
                if consecutive_failures > 3 {
                    info!("{} recovered after {} failed ticks", name, consecutive_failures);
                }
                consecutive_failures = 0;
            }
            Err(e) => {
                consecutive_failures += 1;
                if consecutive_failures <= 3 {
                    warn!("{} tick failed: {} (attempt {})", name, e, consecutive_failures);
                } else if consecutive_failures == 4 {
                    error!(
                        "{} failed {} times in a row, will continue trying silently",
                        name, consecutive_failures
                    );
                } else {
                    debug!("{} tick failed: {}", name, e);
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    // Every sender is gone; nothing can resume the loop
                    break;
                }
            }
        }
    }

    info!("{} loop stopped", name);
    task
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::shutdown::Shutdown;

    struct Counter {
        ticks: u32,
        fail: bool,
    }

    #[async_trait]
    impl PeriodicTask for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        async fn tick(&mut self) -> Result<()> {
            self.ticks += 1;
            if self.fail {
                Err(Error::Uplink(larva_core::Error::Transport("down".to_string())))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_on_interval_until_stopped() {
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(run_periodic(
            Counter { ticks: 0, fail: false },
            Duration::from_secs(60),
            shutdown.subscribe(),
        ));

        // Ticks at t=0, 60, 120
        tokio::time::sleep(Duration::from_secs(150)).await;
        shutdown.signal();

        let task = handle.await.unwrap();
        assert_eq!(task.ticks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_loop() {
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(run_periodic(
            Counter { ticks: 0, fail: true },
            Duration::from_secs(1),
            shutdown.subscribe(),
        ));

        tokio::time::sleep(Duration::from_millis(9_500)).await;
        shutdown.signal();

        let task = handle.await.unwrap();
        assert_eq!(task.ticks, 10);
    }

    #[tokio::test]
    async fn test_stop_interrupts_sleep() {
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(run_periodic(
            Counter { ticks: 0, fail: false },
            Duration::from_secs(3600),
            shutdown.subscribe(),
        ));

        tokio::task::yield_now().await;
        shutdown.signal();

        let task = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(task.ticks <= 1);
    }

    #[tokio::test]
    async fn test_stopped_before_start_runs_nothing() {
        let shutdown = Shutdown::new();
        shutdown.signal();

        let task = run_periodic(
            Counter { ticks: 0, fail: false },
            Duration::from_secs(1),
            shutdown.subscribe(),
        )
        .await;
        assert_eq!(task.ticks, 0);
    }
}
