//! Per-target polling session.
//!
//! A `DeviceWatcher` owns the one live session for its target and drives the
//! batched-poll state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Polling -> Idle -> Polling -> ...
//!       ^              |            |
//!       +--------------+------------+   (failure or reconnect request)
//! ```
//!
//! `Removed` is terminal and only reached when the target leaves the set.

use std::sync::Arc;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::stats::CycleStats;
use crate::channel::{Channel, ChannelError};
use crate::config::CollectorSettings;
use crate::domain::Target;
use crate::monitor::{Classification, ErrorClassifier, ErrorKind, EventEmitter};

/// Watcher lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatcherState {
    /// No session.
    Disconnected,
    /// Connect request in flight.
    Connecting,
    /// Fetching batches.
    Polling,
    /// Session open, waiting for the next cycle.
    Idle,
    /// Target removed; the watcher will not poll again.
    Removed,
}

/// How a successful poll ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// An empty batch was returned; nothing left for this cycle.
    Complete { events: u64 },
    /// The cycle deadline was reached with data possibly still pending.
    DeadlineReached { events: u64 },
    /// The channel asked for a reconnect; the session was dropped.
    Reconnecting { events: u64 },
    /// Connecting failed transiently; retried next cycle.
    ConnectDeferred,
    /// The watcher has been shut down.
    Removed,
}

impl PollOutcome {
    pub fn events(&self) -> u64 {
        match self {
            PollOutcome::Complete { events }
            | PollOutcome::DeadlineReached { events }
            | PollOutcome::Reconnecting { events } => *events,
            PollOutcome::ConnectDeferred | PollOutcome::Removed => 0,
        }
    }
}

/// A fatal failure of one target for one cycle.
#[derive(Debug, Clone, Error)]
#[error("{target_id}: {error}")]
pub struct TargetFailure {
    pub target_id: String,
    pub classification: Classification,
    pub error: ChannelError,
}

impl TargetFailure {
    /// Best description available for logs and down events.
    pub fn summary(&self) -> String {
        self.classification
            .describe()
            .unwrap_or_else(|| self.error.to_string())
    }
}

/// Owns one target's session and polling state.
pub struct DeviceWatcher<C: Channel> {
    target: Arc<Target>,
    channel: Arc<C>,
    classifier: ErrorClassifier,
    session: Option<C::Session>,
    state: WatcherState,
    last_event_count: u64,
}

impl<C: Channel> DeviceWatcher<C> {
    pub fn new(target: Arc<Target>, channel: Arc<C>) -> Self {
        Self {
            target,
            channel,
            classifier: ErrorClassifier::new(),
            session: None,
            state: WatcherState::Disconnected,
            last_event_count: 0,
        }
    }

    pub fn target(&self) -> &Arc<Target> {
        &self.target
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Events emitted by the most recent poll.
    pub fn last_event_count(&self) -> u64 {
        self.last_event_count
    }

    /// Poll the target until it has no more data or `deadline` passes.
    ///
    /// Never issues a new batch request after the deadline, but lets a request
    /// already in flight finish or time out.
    pub async fn poll(
        &mut self,
        deadline: Instant,
        settings: &CollectorSettings,
        emitter: &EventEmitter,
        stats: &CycleStats,
    ) -> Result<PollOutcome, TargetFailure> {
        if self.state == WatcherState::Removed {
            return Ok(PollOutcome::Removed);
        }

        self.last_event_count = 0;

        if self.session.is_none() {
            if let Some(outcome) = self.connect(settings).await? {
                return Ok(outcome);
            }
        }

        self.state = WatcherState::Polling;
        let query_timeout = settings.query_timeout();
        let batch_size = self.target.batch_size(settings.batch_size);
        let mut events = 0u64;

        loop {
            let Some(session) = self.session.as_mut() else {
                self.state = WatcherState::Disconnected;
                return Ok(PollOutcome::Reconnecting { events });
            };

            let fetched = tokio::time::timeout(
                query_timeout,
                self.channel.fetch_batch(session, query_timeout, batch_size),
            )
            .await
            .unwrap_or(Err(ChannelError::Timeout(query_timeout)));

            let batch = match fetched {
                Ok(batch) => batch,
                Err(error) => {
                    self.last_event_count = events;
                    return self.handle_poll_error(error, events).await;
                }
            };

            debug!(target_id = %self.target.id, count = batch.len(), "Got events");
            if batch.is_empty() {
                self.state = WatcherState::Idle;
                self.last_event_count = events;
                return Ok(PollOutcome::Complete { events });
            }

            events += batch.len() as u64;
            for record in batch {
                emitter.emit(stats, &self.target, record);
            }

            if Instant::now() >= deadline {
                info!(
                    target_id = %self.target.id,
                    events,
                    "Cycle time exceeded; deferring remaining events to the next cycle"
                );
                self.state = WatcherState::Idle;
                self.last_event_count = events;
                return Ok(PollOutcome::DeadlineReached { events });
            }
        }
    }

    /// Returns `Some(outcome)` if polling should not proceed this cycle.
    async fn connect(
        &mut self,
        settings: &CollectorSettings,
    ) -> Result<Option<PollOutcome>, TargetFailure> {
        self.state = WatcherState::Connecting;
        let timeout = settings.connect_timeout();
        info!(target_id = %self.target.id, "Connecting");

        let result = tokio::time::timeout(timeout, self.channel.connect(&self.target, timeout))
            .await
            .unwrap_or(Err(ChannelError::Timeout(timeout)));

        match result {
            Ok(session) => {
                info!(target_id = %self.target.id, "Connected");
                self.session = Some(session);
                Ok(None)
            }
            Err(error) => {
                self.state = WatcherState::Disconnected;
                let classification = self.classifier.classify(&error);
                match classification.kind {
                    ErrorKind::Transient | ErrorKind::Ignorable => {
                        info!(
                            target_id = %self.target.id,
                            error = %error,
                            "Connect failed; retrying next cycle"
                        );
                        Ok(Some(PollOutcome::ConnectDeferred))
                    }
                    ErrorKind::Fatal => Err(self.failure(classification, error)),
                }
            }
        }
    }

    async fn handle_poll_error(
        &mut self,
        error: ChannelError,
        events: u64,
    ) -> Result<PollOutcome, TargetFailure> {
        let classification = self.classifier.classify(&error);
        self.teardown().await;

        if classification.kind == ErrorKind::Ignorable {
            info!(
                target_id = %self.target.id,
                error = %error,
                "Ignoring error and restarting connection"
            );
            return Ok(PollOutcome::Reconnecting { events });
        }

        Err(self.failure(classification, error))
    }

    fn failure(&self, classification: Classification, error: ChannelError) -> TargetFailure {
        warn!(
            target_id = %self.target.id,
            kind = %classification.kind,
            code = ?classification.code,
            label = classification.label.unwrap_or(""),
            message = classification.message.unwrap_or(""),
            error = %error,
            "Target failed"
        );
        TargetFailure {
            target_id: self.target.id.clone(),
            classification,
            error,
        }
    }

    async fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(target_id = %self.target.id, "Closing session");
            self.channel.close(session).await;
        }
        if self.state != WatcherState::Removed {
            self.state = WatcherState::Disconnected;
        }
    }

    /// Drop any session and return to `Disconnected`.
    pub async fn reset(&mut self) {
        self.teardown().await;
    }

    /// Close the session for good; the watcher becomes `Removed`.
    pub async fn shutdown(&mut self) {
        self.state = WatcherState::Removed;
        self.teardown().await;
    }
}

impl<C: Channel> std::fmt::Debug for DeviceWatcher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceWatcher")
            .field("target", &self.target.id)
            .field("state", &self.state)
            .field("connected", &self.session.is_some())
            .field("last_event_count", &self.last_event_count)
            .finish()
    }
}
