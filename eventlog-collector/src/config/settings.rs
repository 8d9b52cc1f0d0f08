//! Process-level collector settings.
//!
//! Settings are refreshed from the remote authority and applied as a whole:
//! a refresh either produces a complete new snapshot or leaves the current
//! one untouched.

use std::fmt::Display;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::domain::{AttributeMap, attr_bool, attr_u64};

pub const CYCLE_INTERVAL_SECONDS: &str = "cycleIntervalSeconds";
pub const CONFIG_REFRESH_INTERVAL_MINUTES: &str = "configRefreshIntervalMinutes";
pub const BATCH_SIZE: &str = "batchSize";
pub const QUERY_TIMEOUT_SECONDS: &str = "queryTimeoutSeconds";
pub const CONNECT_TIMEOUT_SECONDS: &str = "connectTimeoutSeconds";
pub const MAX_CONCURRENT_TARGETS: &str = "maxConcurrentTargets";
pub const CONTINUOUS_MODE: &str = "continuousMode";

/// Default scan cycle interval (5 minutes).
const DEFAULT_CYCLE_INTERVAL_SECS: u64 = 5 * 60;

/// Default configuration refresh interval (20 minutes).
const DEFAULT_CONFIG_REFRESH_MINUTES: u64 = 20;

/// Default number of records requested per batch.
const DEFAULT_BATCH_SIZE: usize = 10;

/// Default per-batch query timeout.
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Default connect timeout.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default fan-out limit for concurrent target polling.
const DEFAULT_MAX_CONCURRENT_TARGETS: usize = 8;

/// Heartbeat timeout is this many cycle intervals.
const HEARTBEAT_TIMEOUT_CYCLES: u64 = 3;

/// Upper bound for any interval or timeout given in seconds (7 days).
pub const MAX_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// Upper bound for the config refresh interval, in minutes (7 days).
const MAX_REFRESH_MINUTES: u64 = MAX_INTERVAL_SECS / 60;

/// Upper bound for a batch size, process-wide or per target.
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Upper bound for concurrent target polling.
const MAX_CONCURRENT_TARGETS_LIMIT: usize = 1024;

/// A single attribute changed by a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChange {
    pub name: &'static str,
    pub old: String,
    pub new: String,
}

/// Collector settings snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorSettings {
    pub cycle_interval_secs: u64,
    pub config_refresh_interval_minutes: u64,
    pub batch_size: usize,
    pub query_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_concurrent_targets: usize,
    pub continuous_mode: bool,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            cycle_interval_secs: DEFAULT_CYCLE_INTERVAL_SECS,
            config_refresh_interval_minutes: DEFAULT_CONFIG_REFRESH_MINUTES,
            batch_size: DEFAULT_BATCH_SIZE,
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            max_concurrent_targets: DEFAULT_MAX_CONCURRENT_TARGETS,
            continuous_mode: true,
        }
    }
}

impl CollectorSettings {
    // Accessors clamp, so settings built in code cannot overflow an `Instant`.

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs.min(MAX_INTERVAL_SECS))
    }

    pub fn config_refresh_interval(&self) -> Duration {
        Duration::from_secs(
            self.config_refresh_interval_minutes
                .min(MAX_REFRESH_MINUTES)
                .saturating_mul(60),
        )
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs.min(MAX_INTERVAL_SECS))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.min(MAX_INTERVAL_SECS))
    }

    /// Timeout hint carried by every heartbeat.
    pub fn heartbeat_timeout_secs(&self) -> u64 {
        self.cycle_interval()
            .as_secs()
            .saturating_mul(HEARTBEAT_TIMEOUT_CYCLES)
    }

    /// Apply recognized attributes from `attributes`, returning what changed.
    ///
    /// Unknown keys are ignored. Absent keys and malformed values keep the
    /// current value. The new snapshot is built fully before it replaces
    /// `self`.
    pub fn apply_attributes(&mut self, attributes: &AttributeMap) -> Vec<AttributeChange> {
        let mut next = self.clone();
        let mut changes = Vec::new();

        apply(
            &mut changes,
            attributes,
            CYCLE_INTERVAL_SECONDS,
            &mut next.cycle_interval_secs,
            interval_secs,
        );
        apply(
            &mut changes,
            attributes,
            CONFIG_REFRESH_INTERVAL_MINUTES,
            &mut next.config_refresh_interval_minutes,
            refresh_minutes,
        );
        apply(
            &mut changes,
            attributes,
            BATCH_SIZE,
            &mut next.batch_size,
            batch_size,
        );
        apply(
            &mut changes,
            attributes,
            QUERY_TIMEOUT_SECONDS,
            &mut next.query_timeout_secs,
            interval_secs,
        );
        apply(
            &mut changes,
            attributes,
            CONNECT_TIMEOUT_SECONDS,
            &mut next.connect_timeout_secs,
            interval_secs,
        );
        apply(
            &mut changes,
            attributes,
            MAX_CONCURRENT_TARGETS,
            &mut next.max_concurrent_targets,
            concurrency,
        );
        apply(
            &mut changes,
            attributes,
            CONTINUOUS_MODE,
            &mut next.continuous_mode,
            attr_bool,
        );

        *self = next;
        changes
    }
}

/// Read a value in `1..=max`; anything else is invalid.
fn bounded_u64(value: &Value, max: u64) -> Option<u64> {
    attr_u64(value).filter(|v| (1..=max).contains(v))
}

fn interval_secs(value: &Value) -> Option<u64> {
    bounded_u64(value, MAX_INTERVAL_SECS)
}

fn refresh_minutes(value: &Value) -> Option<u64> {
    bounded_u64(value, MAX_REFRESH_MINUTES)
}

fn batch_size(value: &Value) -> Option<usize> {
    bounded_u64(value, MAX_BATCH_SIZE as u64).map(|v| v as usize)
}

fn concurrency(value: &Value) -> Option<usize> {
    bounded_u64(value, MAX_CONCURRENT_TARGETS_LIMIT as u64).map(|v| v as usize)
}

fn apply<T>(
    changes: &mut Vec<AttributeChange>,
    attributes: &AttributeMap,
    name: &'static str,
    field: &mut T,
    parse: fn(&Value) -> Option<T>,
) where
    T: PartialEq + Display,
{
    let Some(raw) = attributes.get(name) else {
        return;
    };

    match parse(raw) {
        Some(value) if value != *field => {
            changes.push(AttributeChange {
                name,
                old: field.to_string(),
                new: value.to_string(),
            });
            *field = value;
        }
        Some(_) => {}
        None => warn!(attribute = name, value = %raw, "Ignoring invalid attribute value"),
    }
}
