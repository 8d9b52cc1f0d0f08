//! Scan scheduling: per-target watchers and the cycle driver.

mod service;
mod stats;
mod watcher;

pub use service::{CONNECTION_ISSUE_KEY, CycleReport, ScanScheduler, TargetOutcome};
pub use stats::{CycleStats, CycleStatsSnapshot};
pub use watcher::{DeviceWatcher, PollOutcome, TargetFailure, WatcherState};
