//! Scan scheduler.
//!
//! Owns the pool of `DeviceWatcher`s and drives scan cycles across the active
//! target set. Target-set updates published by the config sync engine are
//! picked up only between cycles, so a running cycle always sees one
//! immutable set.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{FutureExt, StreamExt, stream};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::stats::{CycleStats, CycleStatsSnapshot};
use super::watcher::{DeviceWatcher, PollOutcome, TargetFailure};
use crate::channel::Channel;
use crate::config::CollectorSettings;
use crate::context::CollectorContext;
use crate::domain::{NormalizedEvent, Severity, TargetSet};
use crate::monitor::EventEmitter;

/// Event key used for target health events.
pub const CONNECTION_ISSUE_KEY: &str = "connection_issue";

/// Capacity of the cycle report broadcast channel.
const REPORT_CHANNEL_CAPACITY: usize = 16;

/// What happened to one target during a cycle.
#[derive(Debug, Clone)]
pub enum TargetOutcome {
    Polled(PollOutcome),
    Failed(TargetFailure),
    /// The watcher panicked; it has been reset.
    Panicked(String),
}

impl TargetOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TargetOutcome::Failed(_) | TargetOutcome::Panicked(_))
    }
}

/// Summary of one completed scan cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub stats: CycleStatsSnapshot,
    /// Per-target outcomes, ordered by target id.
    pub outcomes: Vec<(String, TargetOutcome)>,
}

impl CycleReport {
    pub fn outcome(&self, target_id: &str) -> Option<&TargetOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == target_id)
            .map(|(_, outcome)| outcome)
    }

    pub fn failed_targets(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_failure())
            .map(|(id, _)| id.as_str())
    }
}

/// Drives scan cycles over the active target set.
pub struct ScanScheduler<C: Channel> {
    ctx: CollectorContext,
    channel: Arc<C>,
    emitter: EventEmitter,
    watchers: HashMap<String, DeviceWatcher<C>>,
    targets: Arc<TargetSet>,
    targets_rx: watch::Receiver<Arc<TargetSet>>,
    /// Targets currently marked down.
    down: HashSet<String>,
    cycles: u64,
    reports: broadcast::Sender<Arc<CycleReport>>,
}

impl<C: Channel> ScanScheduler<C> {
    pub fn new(ctx: CollectorContext, channel: Arc<C>) -> Self {
        let targets_rx = ctx.subscribe_targets();
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        Self {
            emitter: EventEmitter::new(ctx.clone()),
            ctx,
            channel,
            watchers: HashMap::new(),
            targets: Arc::new(TargetSet::new()),
            targets_rx,
            down: HashSet::new(),
            cycles: 0,
            reports,
        }
    }

    /// Subscribe to cycle completion reports.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<CycleReport>> {
        self.reports.subscribe()
    }

    pub fn targets(&self) -> &Arc<TargetSet> {
        &self.targets
    }

    pub fn watcher(&self, target_id: &str) -> Option<&DeviceWatcher<C>> {
        self.watchers.get(target_id)
    }

    pub fn is_down(&self, target_id: &str) -> bool {
        self.down.contains(target_id)
    }

    /// Apply the latest published target set if it is not the active one.
    async fn reload_targets(&mut self) -> bool {
        let latest = self.targets_rx.borrow_and_update().clone();
        if Arc::ptr_eq(&latest, &self.targets) {
            return false;
        }
        self.apply_targets(latest).await;
        true
    }

    /// Reconcile watchers with `targets`.
    ///
    /// Removed targets have their sessions closed. Targets whose attributes
    /// changed get a fresh watcher. Unchanged targets keep their session.
    pub async fn apply_targets(&mut self, targets: Arc<TargetSet>) {
        let removed: Vec<String> = self
            .watchers
            .keys()
            .filter(|id| !targets.contains(id))
            .cloned()
            .collect();
        for id in removed {
            if let Some(mut watcher) = self.watchers.remove(&id) {
                info!(target_id = %id, "Removing watcher");
                watcher.shutdown().await;
            }
            self.down.remove(&id);
        }

        for target in targets.iter() {
            match self.watchers.get_mut(&target.id) {
                Some(watcher) if watcher.target() == target => {}
                Some(watcher) => {
                    info!(target_id = %target.id, "Target attributes changed; rebuilding watcher");
                    watcher.shutdown().await;
                    *watcher = DeviceWatcher::new(target.clone(), self.channel.clone());
                }
                None => {
                    debug!(target_id = %target.id, "Creating watcher");
                    self.watchers.insert(
                        target.id.clone(),
                        DeviceWatcher::new(target.clone(), self.channel.clone()),
                    );
                }
            }
        }

        self.targets = targets;
    }

    /// Run one scan cycle over every target.
    ///
    /// Per-target failures and panics are contained here and never abort
    /// the cycle for other targets.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let settings = self.ctx.settings();
        let started_at = Utc::now();
        let start = Instant::now();
        let deadline = start + settings.cycle_interval();
        let stats = CycleStats::new();
        self.cycles += 1;

        debug!(
            cycle = self.cycles,
            targets = self.watchers.len(),
            "Starting scan cycle"
        );

        let results: Vec<(String, TargetOutcome)> = {
            let emitter = &self.emitter;
            let polls: Vec<_> = self
                .watchers
                .values_mut()
                .map(|watcher| {
                    poll_target(watcher, deadline, &settings, emitter, &stats).boxed()
                })
                .collect();
            stream::iter(polls)
                .buffer_unordered(settings.max_concurrent_targets.max(1))
                .collect()
                .await
        };

        let mut outcomes = results;
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));

        for (id, outcome) in &outcomes {
            match outcome {
                TargetOutcome::Polled(PollOutcome::ConnectDeferred) => {
                    stats.record_unreachable();
                }
                TargetOutcome::Polled(polled) => {
                    stats.record_success();
                    match polled {
                        PollOutcome::Complete { .. } => self.mark_up(id),
                        PollOutcome::DeadlineReached { .. } => {
                            stats.record_deferred();
                            self.mark_up(id);
                        }
                        PollOutcome::ConnectDeferred
                        | PollOutcome::Reconnecting { .. }
                        | PollOutcome::Removed => {}
                    }
                }
                TargetOutcome::Failed(failure) => {
                    stats.record_failure();
                    self.mark_down(id, failure.summary());
                }
                TargetOutcome::Panicked(message) => {
                    stats.record_failure();
                    error!(target_id = %id, panic = %message, "Watcher panicked");
                    if let Some(watcher) = self.watchers.get_mut(id) {
                        watcher.reset().await;
                    }
                    self.mark_down(id, format!("Watcher panicked: {}", message));
                }
            }
        }

        let elapsed = start.elapsed();
        let snapshot = stats.snapshot();
        self.ctx.metrics().record_cycle(
            snapshot.events_emitted,
            snapshot.targets_failed,
            snapshot.targets_deferred,
            elapsed.as_millis() as u64,
        );

        info!(
            cycle = self.cycles,
            events = snapshot.events_emitted,
            succeeded = snapshot.targets_succeeded,
            failed = snapshot.targets_failed,
            unreachable = snapshot.targets_unreachable,
            elapsed_ms = elapsed.as_millis() as u64,
            "Scan cycle complete"
        );

        let report = CycleReport {
            cycle: self.cycles,
            started_at,
            elapsed,
            stats: snapshot,
            outcomes,
        };
        // No subscribers is fine.
        let _ = self.reports.send(Arc::new(report.clone()));
        report
    }

    /// Run scan cycles until cancelled, or after one cycle in single-pass mode.
    pub async fn run(mut self, cancellation_token: CancellationToken) {
        self.reload_targets().await;

        loop {
            if cancellation_token.is_cancelled() {
                break;
            }

            let report = self.run_cycle().await;

            let settings = self.ctx.settings();
            if !settings.continuous_mode {
                info!("Single pass complete; stopping scan loop");
                break;
            }

            let delay = settings.cycle_interval().saturating_sub(report.elapsed);
            debug!(delay_secs = delay.as_secs_f64(), "Next scan cycle scheduled");

            tokio::select! {
                biased;
                _ = cancellation_token.cancelled() => break,
                _ = Self::topology_changed(&mut self.targets_rx) => {
                    info!("Target list changed; starting next cycle now");
                }
                _ = tokio::time::sleep(delay) => {}
            }

            self.reload_targets().await;
        }

        self.shutdown().await;
    }

    async fn topology_changed(rx: &mut watch::Receiver<Arc<TargetSet>>) {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Close every session.
    pub async fn shutdown(&mut self) {
        for (_, mut watcher) in self.watchers.drain() {
            watcher.shutdown().await;
        }
        debug!("Scan scheduler stopped");
    }

    fn mark_down(&mut self, target_id: &str, summary: String) {
        warn!(target_id = %target_id, summary = %summary, "Target marked down");
        self.down.insert(target_id.to_string());
        self.ctx.events().accept(NormalizedEvent::internal(
            target_id,
            CONNECTION_ISSUE_KEY,
            Severity::Error,
            summary,
            self.ctx.agent(),
            self.ctx.monitor(),
        ));
    }

    fn mark_up(&mut self, target_id: &str) {
        if !self.down.remove(target_id) {
            return;
        }
        info!(target_id = %target_id, "Target connection restored");
        self.ctx.events().accept(NormalizedEvent::internal(
            target_id,
            CONNECTION_ISSUE_KEY,
            Severity::Info,
            "connection restored",
            self.ctx.agent(),
            self.ctx.monitor(),
        ));
    }
}

/// Poll one watcher, turning failures and panics into an outcome.
async fn poll_target<C: Channel>(
    watcher: &mut DeviceWatcher<C>,
    deadline: Instant,
    settings: &CollectorSettings,
    emitter: &EventEmitter,
    stats: &CycleStats,
) -> (String, TargetOutcome) {
    let id = watcher.target().id.clone();
    let polled = AssertUnwindSafe(watcher.poll(deadline, settings, emitter, stats))
        .catch_unwind()
        .await;
    let outcome = match polled {
        Ok(Ok(outcome)) => TargetOutcome::Polled(outcome),
        Ok(Err(failure)) => TargetOutcome::Failed(failure),
        Err(payload) => TargetOutcome::Panicked(panic_message(payload.as_ref())),
    };
    (id, outcome)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelError;
    use crate::domain::{ATTR_MIN_SEVERITY, TargetSpec};
    use crate::scheduler::WatcherState;
    use crate::test_utils::{FetchStep, ScriptedChannel, batch, init_tracing, test_context};

    fn target_set(ids: &[&str]) -> Arc<TargetSet> {
        let specs: Vec<TargetSpec> = ids.iter().map(|id| TargetSpec::new(*id)).collect();
        Arc::new(TargetSet::from_specs(&specs))
    }

    fn settings(cycle_secs: u64) -> CollectorSettings {
        CollectorSettings {
            cycle_interval_secs: cycle_secs,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_every_target_visited_once() {
        init_tracing();
        let (ctx, _, _) = test_context(settings(60));
        let channel = ScriptedChannel::new();
        for id in ["a", "b", "c", "d"] {
            channel.push_fetch(id, FetchStep::Batch(batch(0, 2)));
        }
        let mut scheduler = ScanScheduler::new(ctx, channel.clone());
        scheduler.apply_targets(target_set(&["a", "b", "c", "d"])).await;

        let report = scheduler.run_cycle().await;

        assert_eq!(report.outcomes.len(), 4);
        let ids: Vec<&str> = report.outcomes.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(report.stats.events_emitted, 8);
        assert_eq!(report.stats.targets_succeeded, 4);
        assert_eq!(channel.connects(), 4);
        assert_eq!(channel.max_open_per_target(), 1);
    }

    #[tokio::test]
    async fn test_fatal_target_does_not_block_others() {
        let (ctx, events, _) = test_context(settings(60));
        let channel = ScriptedChannel::new();
        channel.push_connect("b", Err(ChannelError::remote("com_error(-2147217405)")));
        channel.push_fetch("a", FetchStep::Batch(batch(0, 3)));
        channel.push_fetch("c", FetchStep::Batch(batch(0, 4)));
        let mut scheduler = ScanScheduler::new(ctx.clone(), channel);
        scheduler.apply_targets(target_set(&["a", "b", "c"])).await;

        let report = scheduler.run_cycle().await;

        assert_eq!(report.stats.targets_failed, 1);
        assert_eq!(report.stats.targets_succeeded, 2);
        assert_eq!(report.stats.events_emitted, 7);
        assert_eq!(report.failed_targets().collect::<Vec<_>>(), vec!["b"]);
        assert!(scheduler.is_down("b"));

        let down: Vec<NormalizedEvent> = events
            .items()
            .into_iter()
            .filter(|e| e.key == CONNECTION_ISSUE_KEY)
            .collect();
        assert_eq!(down.len(), 1);
        assert_eq!(down[0].device_id, "b");
        assert_eq!(down[0].severity, Severity::Error);
        assert!(down[0].summary.starts_with("WBEM_E_ACCESS_DENIED"));
        assert_eq!(ctx.metrics().snapshot().target_failures_total, 1);
    }

    #[tokio::test]
    async fn test_unreachable_target_is_not_a_success() {
        let (ctx, events, _) = test_context(settings(60));
        let channel = ScriptedChannel::new();
        channel.push_connect("a", Err(ChannelError::ConnectionRefused("a".into())));
        channel.push_connect("b", Err(ChannelError::Timeout(Duration::from_secs(30))));
        channel.push_fetch("c", FetchStep::Batch(batch(0, 1)));
        let mut scheduler = ScanScheduler::new(ctx, channel);
        scheduler.apply_targets(target_set(&["a", "b", "c"])).await;

        let report = scheduler.run_cycle().await;

        assert_eq!(report.stats.targets_unreachable, 2);
        assert_eq!(report.stats.targets_succeeded, 1);
        assert_eq!(report.stats.targets_deferred, 0);
        assert_eq!(report.stats.targets_failed, 0);
        assert!(!scheduler.is_down("a"));
        assert!(events.items().iter().all(|e| e.key != CONNECTION_ISSUE_KEY));
    }

    #[tokio::test]
    async fn test_recovered_target_emits_restored_event() {
        let (ctx, events, _) = test_context(settings(60));
        let channel = ScriptedChannel::new();
        channel.push_connect("a", Err(ChannelError::remote("denied")));
        let mut scheduler = ScanScheduler::new(ctx, channel);
        scheduler.apply_targets(target_set(&["a"])).await;

        scheduler.run_cycle().await;
        assert!(scheduler.is_down("a"));
        assert_eq!(
            scheduler.watcher("a").map(|w| w.state()),
            Some(WatcherState::Disconnected)
        );

        scheduler.run_cycle().await;
        assert!(!scheduler.is_down("a"));

        let health: Vec<Severity> = events
            .items()
            .into_iter()
            .filter(|e| e.key == CONNECTION_ISSUE_KEY)
            .map(|e| e.severity)
            .collect();
        assert_eq!(health, vec![Severity::Error, Severity::Info]);
    }

    #[tokio::test]
    async fn test_panicking_watcher_is_contained() {
        let (ctx, _, _) = test_context(settings(60));
        let channel = ScriptedChannel::new();
        channel.push_fetch("a", FetchStep::Panic);
        channel.push_fetch("b", FetchStep::Batch(batch(0, 1)));
        let mut scheduler = ScanScheduler::new(ctx, channel.clone());
        scheduler.apply_targets(target_set(&["a", "b"])).await;

        let report = scheduler.run_cycle().await;

        assert!(matches!(
            report.outcome("a"),
            Some(TargetOutcome::Panicked(message)) if message.contains("scripted panic")
        ));
        assert!(matches!(
            report.outcome("b"),
            Some(TargetOutcome::Polled(PollOutcome::Complete { events: 1 }))
        ));
        assert_eq!(
            scheduler.watcher("a").map(|w| w.state()),
            Some(WatcherState::Disconnected)
        );
        assert_eq!(channel.open_sessions("a"), 0);
    }

    #[tokio::test]
    async fn test_apply_targets_reconciles_watchers() {
        let (ctx, _, _) = test_context(settings(60));
        let channel = ScriptedChannel::new();
        let mut scheduler = ScanScheduler::new(ctx, channel.clone());
        scheduler.apply_targets(target_set(&["a", "b", "c"])).await;
        scheduler.run_cycle().await;
        assert_eq!(channel.connects(), 3);

        // b removed, c changed, a unchanged, d added.
        let specs = vec![
            TargetSpec::new("a"),
            TargetSpec::new("c").with_attribute(ATTR_MIN_SEVERITY, serde_json::json!(3)),
            TargetSpec::new("d"),
        ];
        scheduler
            .apply_targets(Arc::new(TargetSet::from_specs(&specs)))
            .await;

        assert!(scheduler.watcher("b").is_none());
        assert_eq!(channel.open_sessions("b"), 0);
        assert_eq!(channel.open_sessions("c"), 0);
        assert!(scheduler.watcher("a").is_some_and(|w| w.is_connected()));
        assert!(scheduler.watcher("d").is_some_and(|w| !w.is_connected()));

        scheduler.run_cycle().await;
        // Only c and d reconnect.
        assert_eq!(channel.connects(), 5);
        assert_eq!(channel.max_open_per_target(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_pass_stops_after_one_cycle() {
        let mut settings = settings(60);
        settings.continuous_mode = false;
        let (ctx, _, _) = test_context(settings);
        ctx.publish_targets(target_set(&["a"]));
        let channel = ScriptedChannel::new();
        let scheduler = ScanScheduler::new(ctx.clone(), channel.clone());
        let mut reports = scheduler.subscribe();

        scheduler.run(CancellationToken::new()).await;

        assert_eq!(reports.recv().await.unwrap().cycle, 1);
        assert_eq!(ctx.metrics().cycles_total(), 1);
        // Sessions are closed on exit.
        assert_eq!(channel.open_sessions("a"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_cycle_waits_for_remaining_interval() {
        let (ctx, _, _) = test_context(settings(60));
        ctx.publish_targets(target_set(&["a"]));
        let channel = ScriptedChannel::with_fetch_delay(Duration::from_secs(1));
        channel.push_fetch("a", FetchStep::Batch(batch(0, 1)));
        channel.push_fetch("a", FetchStep::Batch(batch(1, 1)));
        let scheduler = ScanScheduler::new(ctx.clone(), channel);
        let mut reports = scheduler.subscribe();
        let token = CancellationToken::new();
        let start = Instant::now();
        let task = tokio::spawn(scheduler.run(token.clone()));

        let first = reports.recv().await.unwrap();
        assert_eq!(first.elapsed, Duration::from_secs(3));
        let second = reports.recv().await.unwrap();
        assert_eq!(second.cycle, 2);
        // Second cycle starts 60s after the first one did.
        assert_eq!(start.elapsed(), Duration::from_secs(61));

        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_topology_change_starts_next_cycle_early() {
        let (ctx, _, _) = test_context(settings(300));
        ctx.publish_targets(target_set(&["a"]));
        let channel = ScriptedChannel::new();
        let scheduler = ScanScheduler::new(ctx.clone(), channel.clone());
        let mut reports = scheduler.subscribe();
        let token = CancellationToken::new();
        let start = Instant::now();
        let task = tokio::spawn(scheduler.run(token.clone()));

        reports.recv().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        ctx.publish_targets(target_set(&["a", "b"]));

        let second = reports.recv().await.unwrap();
        assert_eq!(second.outcomes.len(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(10));

        token.cancel();
        task.await.unwrap();
        assert_eq!(channel.open_sessions("a"), 0);
        assert_eq!(channel.open_sessions("b"), 0);
    }
}
