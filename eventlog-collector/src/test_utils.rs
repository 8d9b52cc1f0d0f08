//! Scripted capabilities shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::authority::{AuthorityError, RemoteAuthority};
use crate::channel::{Channel, ChannelError};
use crate::config::CollectorSettings;
use crate::context::CollectorContext;
use crate::domain::{AttributeMap, Heartbeat, NormalizedEvent, RawRecord, Target, TargetSpec};
use crate::sink::Sink;

/// Initialize tracing for tests with appropriate settings
#[inline]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Sink that keeps everything it accepts.
pub struct CollectingSink<T> {
    items: Mutex<Vec<T>>,
}

impl<T: Clone> CollectingSink<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(Vec::new()),
        })
    }

    pub fn items(&self) -> Vec<T> {
        self.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}

impl<T: Send + 'static> Sink<T> for CollectingSink<T> {
    fn accept(&self, item: T) {
        self.items.lock().push(item);
    }
}

/// Context wired to collecting sinks.
pub fn test_context(
    settings: CollectorSettings,
) -> (
    CollectorContext,
    Arc<CollectingSink<NormalizedEvent>>,
    Arc<CollectingSink<Heartbeat>>,
) {
    let events = CollectingSink::new();
    let liveness = CollectingSink::new();
    let ctx = CollectorContext::new(
        "zeneventlog",
        "localhost",
        settings,
        events.clone(),
        liveness.clone(),
    )
    .with_hostname("collector-1");
    (ctx, events, liveness)
}

/// Build a record with the given event code.
pub fn record(code: u32) -> RawRecord {
    RawRecord {
        source_name: "Application Error".to_string(),
        event_code: code,
        event_type: 1,
        message: Some(format!("event {}", code)),
        log_file: "Application".to_string(),
        time_generated: "20240102030405.000000-000".to_string(),
        ..Default::default()
    }
}

/// Build a batch of `n` records starting at `first`.
pub fn batch(first: u32, n: u32) -> Vec<RawRecord> {
    (first..first + n).map(record).collect()
}

/// Authority returning whatever the test last configured.
#[derive(Default)]
pub struct StaticAuthority {
    process: Mutex<AttributeMap>,
    targets: Mutex<Vec<TargetSpec>>,
    fail_process: AtomicBool,
    fail_targets: AtomicBool,
    calls: AtomicUsize,
}

impl StaticAuthority {
    pub fn new(process: AttributeMap, targets: Vec<TargetSpec>) -> Arc<Self> {
        Arc::new(Self {
            process: Mutex::new(process),
            targets: Mutex::new(targets),
            ..Default::default()
        })
    }

    pub fn set_process(&self, process: AttributeMap) {
        *self.process.lock() = process;
    }

    pub fn set_targets(&self, targets: Vec<TargetSpec>) {
        *self.targets.lock() = targets;
    }

    pub fn fail_process(&self, fail: bool) {
        self.fail_process.store(fail, Ordering::SeqCst);
    }

    pub fn fail_targets(&self, fail: bool) {
        self.fail_targets.store(fail, Ordering::SeqCst);
    }

    /// Number of `get_process_config` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteAuthority for StaticAuthority {
    async fn get_process_config(&self) -> Result<AttributeMap, AuthorityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_process.load(Ordering::SeqCst) {
            return Err(AuthorityError::Unavailable("process config".into()));
        }
        Ok(self.process.lock().clone())
    }

    async fn get_target_list(&self, _selector: &str) -> Result<Vec<TargetSpec>, AuthorityError> {
        if self.fail_targets.load(Ordering::SeqCst) {
            return Err(AuthorityError::Unavailable("target list".into()));
        }
        Ok(self.targets.lock().clone())
    }
}

/// What a scripted fetch returns.
#[derive(Debug, Clone)]
pub enum FetchStep {
    Batch(Vec<RawRecord>),
    Fail(ChannelError),
    /// Return `n` records on every fetch, forever.
    Endless(u32),
    Panic,
}

#[derive(Default)]
struct TargetScript {
    connects: VecDeque<Result<(), ChannelError>>,
    fetches: VecDeque<FetchStep>,
    endless: Option<u32>,
    next_code: u32,
}

/// Session handed out by `ScriptedChannel`.
#[derive(Debug)]
pub struct ScriptedSession {
    pub target_id: String,
    pub serial: usize,
}

/// Channel whose behavior is scripted per target.
///
/// Exhausted connect scripts succeed; exhausted fetch scripts return empty
/// batches. Every fetch takes `fetch_delay` of (tokio) time.
#[derive(Default)]
pub struct ScriptedChannel {
    scripts: Mutex<HashMap<String, TargetScript>>,
    open_sessions: Mutex<HashMap<String, usize>>,
    max_open_per_target: AtomicUsize,
    fetch_delay: Mutex<Duration>,
    connects: AtomicUsize,
    fetches: AtomicUsize,
    closes: AtomicUsize,
}

impl ScriptedChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_fetch_delay(delay: Duration) -> Arc<Self> {
        let channel = Self::default();
        *channel.fetch_delay.lock() = delay;
        Arc::new(channel)
    }

    pub fn push_connect(&self, target_id: &str, result: Result<(), ChannelError>) {
        self.scripts
            .lock()
            .entry(target_id.to_string())
            .or_default()
            .connects
            .push_back(result);
    }

    pub fn push_fetch(&self, target_id: &str, step: FetchStep) {
        self.scripts
            .lock()
            .entry(target_id.to_string())
            .or_default()
            .fetches
            .push_back(step);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn open_sessions(&self, target_id: &str) -> usize {
        self.open_sessions
            .lock()
            .get(target_id)
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of simultaneously open sessions seen for any target.
    pub fn max_open_per_target(&self) -> usize {
        self.max_open_per_target.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    type Session = ScriptedSession;

    async fn connect(
        &self,
        target: &Target,
        _timeout: Duration,
    ) -> Result<ScriptedSession, ChannelError> {
        let serial = self.connects.fetch_add(1, Ordering::SeqCst);
        let result = self
            .scripts
            .lock()
            .entry(target.id.clone())
            .or_default()
            .connects
            .pop_front()
            .unwrap_or(Ok(()));
        result?;

        let mut open = self.open_sessions.lock();
        let count = open.entry(target.id.clone()).or_insert(0);
        *count += 1;
        self.max_open_per_target
            .fetch_max(*count, Ordering::SeqCst);

        Ok(ScriptedSession {
            target_id: target.id.clone(),
            serial,
        })
    }

    async fn fetch_batch(
        &self,
        session: &mut ScriptedSession,
        timeout: Duration,
        max_count: usize,
    ) -> Result<Vec<RawRecord>, ChannelError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock();
        if delay > timeout {
            tokio::time::sleep(timeout).await;
            return Err(ChannelError::Timeout(timeout));
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut scripts = self.scripts.lock();
        let script = scripts.entry(session.target_id.clone()).or_default();

        if let Some(n) = script.endless {
            let first = script.next_code;
            script.next_code += n;
            return Ok(batch(first, n.min(max_count as u32)));
        }

        match script.fetches.pop_front() {
            Some(FetchStep::Batch(records)) => {
                Ok(records.into_iter().take(max_count).collect())
            }
            Some(FetchStep::Fail(err)) => Err(err),
            Some(FetchStep::Panic) => {
                drop(scripts);
                panic!("scripted panic for {}", session.target_id);
            }
            Some(FetchStep::Endless(n)) => {
                script.endless = Some(n);
                let first = script.next_code;
                script.next_code += n;
                Ok(batch(first, n.min(max_count as u32)))
            }
            None => Ok(Vec::new()),
        }
    }

    async fn close(&self, session: ScriptedSession) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if let Some(count) = self.open_sessions.lock().get_mut(&session.target_id) {
            *count = count.saturating_sub(1);
        }
    }
}
