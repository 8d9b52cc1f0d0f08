//! Liveness reporting.
//!
//! One heartbeat is emitted per completed scan cycle. Its timeout hint is
//! three cycle intervals, read from the settings in effect when the heartbeat
//! is sent, so an external watchdog only declares the collector dead after
//! roughly three missed cycles.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::context::CollectorContext;
use crate::domain::{Heartbeat, NormalizedEvent, Severity};
use crate::scheduler::{CycleReport, CycleStatsSnapshot};

/// Event key for the process start event.
pub const APP_START_KEY: &str = "app_start";

/// Event key for the process stop event.
pub const APP_STOP_KEY: &str = "app_stop";

/// Emits heartbeats and process lifecycle events.
#[derive(Debug, Clone)]
pub struct HeartbeatReporter {
    ctx: CollectorContext,
}

impl HeartbeatReporter {
    pub fn new(ctx: CollectorContext) -> Self {
        Self { ctx }
    }

    /// Emit the heartbeat for a completed cycle.
    pub fn report(&self, stats: &CycleStatsSnapshot) -> Heartbeat {
        let heartbeat = Heartbeat {
            component: self.ctx.agent().to_string(),
            device: self.ctx.hostname().to_string(),
            timeout_seconds: self.ctx.settings().heartbeat_timeout_secs(),
        };
        debug!(
            timeout_seconds = heartbeat.timeout_seconds,
            events = stats.events_emitted,
            failed = stats.targets_failed,
            "Sending heartbeat"
        );
        self.ctx.liveness().accept(heartbeat.clone());
        self.ctx.metrics().record_heartbeat();
        heartbeat
    }

    /// Emit the process start event.
    pub fn start(&self) {
        info!("Starting {}", self.ctx.agent());
        self.lifecycle_event(APP_START_KEY, Severity::Info, "Starting");
    }

    /// Emit the process stop event.
    pub fn stop(&self) {
        info!("Stopping {}", self.ctx.agent());
        self.lifecycle_event(APP_STOP_KEY, Severity::Warning, "Stopping");
    }

    fn lifecycle_event(&self, key: &str, severity: Severity, verb: &str) {
        self.ctx.events().accept(NormalizedEvent::internal(
            self.ctx.hostname(),
            key,
            severity,
            format!("{} {}", verb, self.ctx.agent()),
            self.ctx.agent(),
            self.ctx.monitor(),
        ));
    }

    /// Report every cycle until the scheduler's report channel closes.
    pub async fn run(self, mut reports: broadcast::Receiver<Arc<CycleReport>>) {
        loop {
            match reports.recv().await {
                Ok(report) => {
                    self.report(&report.stats);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Heartbeat reporter lagged behind scan cycles");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Heartbeat reporter stopped");
    }
}
