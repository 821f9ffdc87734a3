//! Graceful shutdown signalling for the scheduler loop.

use tokio::sync::watch;

/// Shutdown handle pair: hold a [`Shutdown`] to signal, give each loop a
/// [`ShutdownListener`] to observe.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> (Self, ShutdownListener) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, ShutdownListener { rx })
    }

    /// Signal every listener to stop after their current step.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

impl ShutdownListener {
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until shutdown is signalled.
    pub async fn recv(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listeners_observe_the_signal() {
        let (shutdown, listener) = Shutdown::new();
        assert!(!listener.is_shutdown());
        shutdown.shutdown();
        assert!(listener.is_shutdown());
        let mut listener = listener;
        listener.recv().await;
    }
}
