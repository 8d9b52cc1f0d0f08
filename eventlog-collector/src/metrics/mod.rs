//! Liveness reporting and process-lifetime counters.

mod collector;
mod heartbeat;

pub use collector::{CollectorMetrics, MetricsSnapshot};
pub use heartbeat::{APP_START_KEY, APP_STOP_KEY, HeartbeatReporter};
