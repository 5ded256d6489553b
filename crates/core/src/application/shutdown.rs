// Shutdown Token
//
// One-shot stop signal built on a watch channel. Used for process shutdown
// (daemon -> HTTP server) and for cancelling a subscriber's in-flight delivery
// when its handle is removed.

use tokio::sync::watch;

/// Receiving side of a shutdown signal
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for shutdown signal
    ///
    /// Also returns once the sender is dropped, so a forgotten sender can
    /// never leave a waiter parked forever.
    pub async fn wait(&mut self) {
        if self.is_shutdown() {
            return;
        }
        let _ = self.rx.changed().await;
    }
}

/// Sending side of a shutdown signal
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to every token cloned from this channel
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}
