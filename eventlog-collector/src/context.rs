//! Shared collector context.
//!
//! One `CollectorContext` is built at startup and cloned into every component.
//! It carries identity, the output sinks, lifetime metrics, and the published
//! settings and target set. Only the config sync engine publishes; everyone
//! else reads.

use std::sync::Arc;

use sysinfo::System;
use tokio::sync::watch;

use crate::config::CollectorSettings;
use crate::domain::{Heartbeat, NormalizedEvent, TargetSet};
use crate::metrics::CollectorMetrics;
use crate::sink::Sink;

/// Default agent (component) name.
pub const DEFAULT_AGENT: &str = "zeneventlog";

/// Explicit process context passed to each component constructor.
#[derive(Clone)]
pub struct CollectorContext {
    agent: String,
    monitor: String,
    hostname: String,
    settings: Arc<watch::Sender<CollectorSettings>>,
    targets: Arc<watch::Sender<Arc<TargetSet>>>,
    events: Arc<dyn Sink<NormalizedEvent>>,
    liveness: Arc<dyn Sink<Heartbeat>>,
    metrics: Arc<CollectorMetrics>,
}

impl CollectorContext {
    /// Create a context with an empty target set.
    pub fn new(
        agent: impl Into<String>,
        monitor: impl Into<String>,
        settings: CollectorSettings,
        events: Arc<dyn Sink<NormalizedEvent>>,
        liveness: Arc<dyn Sink<Heartbeat>>,
    ) -> Self {
        let (settings_tx, _) = watch::channel(settings);
        let (targets_tx, _) = watch::channel(Arc::new(TargetSet::new()));
        Self {
            agent: agent.into(),
            monitor: monitor.into(),
            hostname: System::host_name().unwrap_or_else(|| "localhost".to_string()),
            settings: Arc::new(settings_tx),
            targets: Arc::new(targets_tx),
            events,
            liveness,
            metrics: Arc::new(CollectorMetrics::new()),
        }
    }

    /// Override the host name reported in heartbeats.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn monitor(&self) -> &str {
        &self.monitor
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn events(&self) -> &Arc<dyn Sink<NormalizedEvent>> {
        &self.events
    }

    pub fn liveness(&self) -> &Arc<dyn Sink<Heartbeat>> {
        &self.liveness
    }

    pub fn metrics(&self) -> &Arc<CollectorMetrics> {
        &self.metrics
    }

    /// Latest fully applied settings snapshot.
    pub fn settings(&self) -> CollectorSettings {
        self.settings.borrow().clone()
    }

    pub fn subscribe_settings(&self) -> watch::Receiver<CollectorSettings> {
        self.settings.subscribe()
    }

    /// Latest published target set.
    pub fn targets(&self) -> Arc<TargetSet> {
        self.targets.borrow().clone()
    }

    pub fn subscribe_targets(&self) -> watch::Receiver<Arc<TargetSet>> {
        self.targets.subscribe()
    }

    pub(crate) fn publish_settings(&self, settings: CollectorSettings) {
        self.settings.send_replace(settings);
    }

    pub(crate) fn publish_targets(&self, targets: Arc<TargetSet>) {
        self.targets.send_replace(targets);
    }
}

impl std::fmt::Debug for CollectorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorContext")
            .field("agent", &self.agent)
            .field("monitor", &self.monitor)
            .field("hostname", &self.hostname)
            .field("settings", &*self.settings.borrow())
            .field("targets", &self.targets.borrow().len())
            .finish()
    }
}
