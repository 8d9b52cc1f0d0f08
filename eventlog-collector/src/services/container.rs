//! Collector service container.
//!
//! Wires the config sync engine, scan scheduler and heartbeat reporter around
//! one shared `CollectorContext` and owns the process lifecycle.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::authority::RemoteAuthority;
use crate::channel::Channel;
use crate::config::{CONTINUOUS_MODE, ConfigNotifier, ConfigSyncEngine};
use crate::context::CollectorContext;
use crate::domain::AttributeMap;
use crate::metrics::HeartbeatReporter;
use crate::scheduler::{CycleReport, ScanScheduler};
use crate::{Error, Result};

/// The assembled collector process.
pub struct Collector<A: RemoteAuthority, C: Channel> {
    ctx: CollectorContext,
    authority: Arc<A>,
    selector: String,
    scheduler: ScanScheduler<C>,
    heartbeat: HeartbeatReporter,
    notifier: ConfigNotifier,
    notifications: mpsc::Receiver<()>,
    pinned: AttributeMap,
    cancellation_token: CancellationToken,
}

impl<A: RemoteAuthority, C: Channel> Collector<A, C> {
    pub fn new(
        ctx: CollectorContext,
        authority: Arc<A>,
        channel: Arc<C>,
        selector: impl Into<String>,
    ) -> Self {
        let (notifier, notifications) = ConfigNotifier::channel();
        Self {
            scheduler: ScanScheduler::new(ctx.clone(), channel),
            heartbeat: HeartbeatReporter::new(ctx.clone()),
            ctx,
            authority,
            selector: selector.into(),
            notifier,
            notifications,
            pinned: AttributeMap::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Run one scan cycle and exit, whatever the authority says.
    pub fn with_single_pass(mut self, single_pass: bool) -> Self {
        if single_pass {
            self.pinned
                .insert(CONTINUOUS_MODE.to_string(), serde_json::Value::Bool(false));
        } else {
            self.pinned.remove(CONTINUOUS_MODE);
        }
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn context(&self) -> &CollectorContext {
        &self.ctx
    }

    /// Handle for out-of-band configuration change notifications.
    pub fn notifier(&self) -> ConfigNotifier {
        self.notifier.clone()
    }

    /// Subscribe to scan cycle reports.
    pub fn subscribe_cycles(&self) -> broadcast::Receiver<Arc<CycleReport>> {
        self.scheduler.subscribe()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Request a graceful shutdown.
    pub fn shutdown(&self) {
        info!("Shutting down collector");
        self.cancellation_token.cancel();
    }

    /// Run until cancelled, or until the single scan pass completes.
    pub async fn run(self) -> Result<()> {
        let Self {
            ctx,
            authority,
            selector,
            scheduler,
            heartbeat,
            notifier: _,
            notifications,
            pinned,
            cancellation_token,
        } = self;

        heartbeat.start();

        let mut sync = ConfigSyncEngine::new(ctx.clone(), authority, selector)
            .with_notifications(notifications);
        for (name, value) in pinned {
            sync = sync.with_pinned(name, value);
        }

        if sync.refresh_logged().await.is_none() {
            warn!("Initial config refresh failed; continuing with current settings");
        }

        let config_token = cancellation_token.child_token();
        let config_task = tokio::spawn(sync.run(config_token.clone()));
        let heartbeat_task = tokio::spawn(heartbeat.clone().run(scheduler.subscribe()));

        scheduler.run(cancellation_token).await;

        config_token.cancel();
        let config_result = config_task.await;
        // The scheduler is gone, so the report channel is closed.
        let heartbeat_result = heartbeat_task.await;

        heartbeat.stop();
        debug!(metrics = ?ctx.metrics().snapshot(), "Collector stopped");

        config_result.map_err(|e| Error::other(format!("config sync task failed: {}", e)))?;
        heartbeat_result.map_err(|e| Error::other(format!("heartbeat task failed: {}", e)))?;
        Ok(())
    }
}
