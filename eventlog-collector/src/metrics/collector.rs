//! Process-lifetime counters.
//!
//! Per-cycle numbers live in `CycleStats`; this collector accumulates the
//! totals across cycles for the lifetime of the process.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Metrics collector for the event log collector.
#[derive(Debug, Default)]
pub struct CollectorMetrics {
    // Scan metrics
    cycles_total: AtomicU64,
    events_total: AtomicU64,
    target_failures_total: AtomicU64,
    targets_deferred_total: AtomicU64,
    last_cycle_duration_ms: AtomicU64,

    // Config metrics
    config_refreshes_total: AtomicU64,
    config_refresh_failures_total: AtomicU64,

    // Liveness
    heartbeats_total: AtomicU64,
}

/// Point-in-time copy of the collector metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub cycles_total: u64,
    pub events_total: u64,
    pub target_failures_total: u64,
    pub targets_deferred_total: u64,
    pub last_cycle_duration_ms: u64,
    pub config_refreshes_total: u64,
    pub config_refresh_failures_total: u64,
    pub heartbeats_total: u64,
}

impl CollectorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Scan Metrics ==========

    /// Record a completed scan cycle.
    pub fn record_cycle(&self, events: u64, failures: u64, deferred: u64, duration_ms: u64) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
        self.events_total.fetch_add(events, Ordering::Relaxed);
        self.target_failures_total
            .fetch_add(failures, Ordering::Relaxed);
        self.targets_deferred_total
            .fetch_add(deferred, Ordering::Relaxed);
        self.last_cycle_duration_ms
            .store(duration_ms, Ordering::Relaxed);
    }

    pub fn events_total(&self) -> u64 {
        self.events_total.load(Ordering::Relaxed)
    }

    pub fn cycles_total(&self) -> u64 {
        self.cycles_total.load(Ordering::Relaxed)
    }

    // ========== Config Metrics ==========

    pub fn record_config_refresh(&self) {
        self.config_refreshes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_config_refresh_failure(&self) {
        self.config_refresh_failures_total
            .fetch_add(1, Ordering::Relaxed);
    }

    // ========== Liveness ==========

    pub fn record_heartbeat(&self) {
        self.heartbeats_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles_total: self.cycles_total.load(Ordering::Relaxed),
            events_total: self.events_total.load(Ordering::Relaxed),
            target_failures_total: self.target_failures_total.load(Ordering::Relaxed),
            targets_deferred_total: self.targets_deferred_total.load(Ordering::Relaxed),
            last_cycle_duration_ms: self.last_cycle_duration_ms.load(Ordering::Relaxed),
            config_refreshes_total: self.config_refreshes_total.load(Ordering::Relaxed),
            config_refresh_failures_total: self
                .config_refresh_failures_total
                .load(Ordering::Relaxed),
            heartbeats_total: self.heartbeats_total.load(Ordering::Relaxed),
        }
    }
}
