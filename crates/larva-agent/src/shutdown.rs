//! Shutdown signalling shared by all loops.

use std::sync::Arc;

use tokio::sync::watch;

/// A one-way stop signal.
///
/// Cloning shares the same signal. Loops hold a receiver from
/// [`Shutdown::subscribe`] and see the stop both while sleeping and at the
/// top of each iteration.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Get a receiver for the stop signal.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Signal every loop to stop after its current tick.
    pub fn signal(&self) {
        // send_replace stores the value even when nobody is subscribed yet
        self.tx.send_replace(true);
    }

    /// Whether stop has been signalled.
    pub fn is_signalled(&self) -> bool {
        *self.tx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_subscribe() {
        let shutdown = Shutdown::new();
        let rx1 = shutdown.subscribe();
        let rx2 = shutdown.clone().subscribe();

        assert!(!*rx1.borrow());
        shutdown.signal();
        assert!(*rx1.borrow());
        assert!(*rx2.borrow());
        assert!(shutdown.is_signalled());
    }

    #[test]
    fn test_signal_before_subscribe() {
        let shutdown = Shutdown::new();
        shutdown.signal();
        assert!(*shutdown.subscribe().borrow());
    }
}
