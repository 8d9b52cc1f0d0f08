//! Out-of-band configuration change notifications.
//!
//! The authority may tell the collector that its configuration changed
//! instead of waiting for the next periodic refresh. Notifications coalesce:
//! while one is queued, further ones are dropped, and the sync engine
//! debounces them before refreshing.

use tokio::sync::mpsc;
use tracing::debug;

/// Handle used to request an early configuration refresh.
#[derive(Debug, Clone)]
pub struct ConfigNotifier {
    tx: mpsc::Sender<()>,
}

impl ConfigNotifier {
    /// Create a notifier and the receiving end consumed by the sync engine.
    pub fn channel() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Request a configuration refresh.
    ///
    /// Returns `false` if the sync engine is gone.
    pub fn notify_changed(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("Config change notification already pending");
                true
            }
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }
}
