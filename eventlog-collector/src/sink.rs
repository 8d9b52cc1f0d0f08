//! Output capabilities for normalized events and liveness records.
//!
//! Sinks are fire-and-forget: `accept` never blocks and never fails from the
//! collector's point of view.

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::domain::{Heartbeat, NormalizedEvent};

/// Default channel capacity for broadcast sinks.
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// A fire-and-forget consumer of collector output.
pub trait Sink<T>: Send + Sync + 'static {
    fn accept(&self, item: T);
}

/// Sink distributing items to any number of subscribers.
///
/// Items published while nobody is subscribed are dropped.
pub struct BroadcastSink<T: Clone> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone + Send + 'static> BroadcastSink<T> {
    /// Create a new sink with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new sink with specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone + Send + 'static> Default for BroadcastSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for BroadcastSink<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Sink<T> for BroadcastSink<T> {
    fn accept(&self, item: T) {
        // send() returns Err if there are no receivers, which is fine
        let _ = self.sender.send(item);
    }
}

/// Sink that writes output to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl Sink<NormalizedEvent> for TracingSink {
    fn accept(&self, event: NormalizedEvent) {
        info!(
            device = %event.device_id,
            key = %event.key,
            severity = %event.severity,
            component = %event.source_component,
            "{}",
            event.summary
        );
    }
}

impl Sink<Heartbeat> for TracingSink {
    fn accept(&self, heartbeat: Heartbeat) {
        debug!(
            component = %heartbeat.component,
            device = %heartbeat.device,
            timeout_secs = heartbeat.timeout_seconds,
            "Heartbeat"
        );
    }
}
