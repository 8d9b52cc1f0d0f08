//! Configuration sync engine.
//!
//! Keeps the local settings snapshot and target set in step with the remote
//! authority. Runs on its own (minutes-scale) cadence, independent of the scan
//! cycle, and re-arms unconditionally after every refresh, successful or not.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::ConfigSnapshot;
use super::settings::AttributeChange;
use crate::Result;
use crate::authority::{AuthorityError, RemoteAuthority};
use crate::context::CollectorContext;
use crate::domain::{AttributeMap, TargetSet};

/// Delay between a change notification and the refresh it triggers.
pub const DEFAULT_NOTIFY_DEBOUNCE: Duration = Duration::from_secs(5);

/// Upper bound on a single authority call.
pub const DEFAULT_AUTHORITY_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of one successful refresh.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// Process attributes that changed, in application order.
    pub changes: Vec<AttributeChange>,
    /// Whether the target set differs from the previous one.
    pub targets_changed: bool,
    /// The target set after the refresh.
    pub targets: Arc<TargetSet>,
}

impl RefreshOutcome {
    pub fn is_unchanged(&self) -> bool {
        self.changes.is_empty() && !self.targets_changed
    }
}

/// Periodically refreshes settings and targets from the remote authority.
pub struct ConfigSyncEngine<A: RemoteAuthority> {
    ctx: CollectorContext,
    authority: Arc<A>,
    selector: String,
    snapshot: ConfigSnapshot,
    targets: Arc<TargetSet>,
    /// Attributes forced locally; they override whatever the authority says.
    pinned: AttributeMap,
    notifications: Option<mpsc::Receiver<()>>,
    debounce: Duration,
    authority_timeout: Duration,
}

impl<A: RemoteAuthority> ConfigSyncEngine<A> {
    /// Create an engine seeded from the context's current settings and targets.
    pub fn new(ctx: CollectorContext, authority: Arc<A>, selector: impl Into<String>) -> Self {
        let snapshot = ctx.settings();
        let targets = ctx.targets();
        Self {
            ctx,
            authority,
            selector: selector.into(),
            snapshot,
            targets,
            pinned: AttributeMap::new(),
            notifications: None,
            debounce: DEFAULT_NOTIFY_DEBOUNCE,
            authority_timeout: DEFAULT_AUTHORITY_TIMEOUT,
        }
    }

    /// Pin an attribute to a local value.
    ///
    /// The pinned value is applied immediately and on every refresh.
    pub fn with_pinned(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.pinned.insert(name.into(), value);
        let changes = self.snapshot.apply_attributes(&self.pinned);
        if !changes.is_empty() {
            self.ctx.publish_settings(self.snapshot.clone());
        }
        self
    }

    /// Attach the receiving end of a `ConfigNotifier`.
    pub fn with_notifications(mut self, rx: mpsc::Receiver<()>) -> Self {
        self.notifications = Some(rx);
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_authority_timeout(mut self, timeout: Duration) -> Self {
        self.authority_timeout = timeout;
        self
    }

    /// Current settings snapshot.
    pub fn snapshot(&self) -> &ConfigSnapshot {
        &self.snapshot
    }

    /// Current target set.
    pub fn targets(&self) -> &Arc<TargetSet> {
        &self.targets
    }

    /// Fetch process attributes and the target list, then apply both.
    ///
    /// Nothing is applied unless both fetches succeed.
    pub async fn refresh(&mut self) -> Result<RefreshOutcome> {
        let timeout = self.authority_timeout;

        let mut attributes =
            tokio::time::timeout(timeout, self.authority.get_process_config())
                .await
                .map_err(|_| AuthorityError::Timeout)??;
        let specs =
            tokio::time::timeout(timeout, self.authority.get_target_list(&self.selector))
                .await
                .map_err(|_| AuthorityError::Timeout)??;

        attributes.extend(self.pinned.clone());
        let changes = self.snapshot.apply_attributes(&attributes);
        for change in &changes {
            info!(
                attribute = change.name,
                old = %change.old,
                new = %change.new,
                "Setting {} to {}",
                change.name,
                change.new
            );
        }
        if !changes.is_empty() {
            self.ctx.publish_settings(self.snapshot.clone());
        }

        let targets = TargetSet::from_specs(&specs);
        let targets_changed = targets != *self.targets;
        if targets_changed {
            let added = targets
                .ids()
                .filter(|id| !self.targets.contains(id))
                .count();
            let removed = self
                .targets
                .ids()
                .filter(|id| !targets.contains(id))
                .count();
            info!(
                total = targets.len(),
                added, removed, "Target list changed"
            );
            self.targets = Arc::new(targets);
            self.ctx.publish_targets(self.targets.clone());
        } else {
            debug!(total = self.targets.len(), "Target list unchanged");
        }

        self.ctx.metrics().record_config_refresh();

        Ok(RefreshOutcome {
            changes,
            targets_changed,
            targets: self.targets.clone(),
        })
    }

    /// Refresh, logging instead of returning failures.
    pub async fn refresh_logged(&mut self) -> Option<RefreshOutcome> {
        match self.refresh().await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                self.ctx.metrics().record_config_refresh_failure();
                error!(error = %e, "Error fetching config");
                None
            }
        }
    }

    /// Run the periodic refresh loop until cancelled.
    ///
    /// The first refresh happens one refresh interval after start; callers are
    /// expected to have performed the initial refresh themselves.
    pub async fn run(mut self, cancellation_token: CancellationToken) {
        info!(
            interval_mins = self.snapshot.config_refresh_interval_minutes,
            "Config sync loop starting"
        );

        let mut notifications = self.notifications.take();
        let mut next_refresh = Instant::now() + self.snapshot.config_refresh_interval();
        let mut pending: Option<Instant> = None;

        loop {
            let deadline = match pending {
                Some(at) => at.min(next_refresh),
                None => next_refresh,
            };

            tokio::select! {
                _ = cancellation_token.cancelled() => break,

                notified = Self::recv_notification(&mut notifications) => {
                    match notified {
                        Some(()) => {
                            info!("Async config notification");
                            // Replace any pending timer rather than stacking a second one.
                            pending = Some(Instant::now() + self.debounce);
                        }
                        None => notifications = None,
                    }
                    continue;
                }

                _ = tokio::time::sleep_until(deadline) => {}
            }

            pending = None;

            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                _ = self.refresh_logged() => {}
            }

            next_refresh = Instant::now() + self.snapshot.config_refresh_interval();
        }

        debug!("Config sync loop stopped");
    }

    async fn recv_notification(rx: &mut Option<mpsc::Receiver<()>>) -> Option<()> {
        match rx {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }
}
