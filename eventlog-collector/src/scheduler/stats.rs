//! Per-cycle statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters for a single scan cycle.
///
/// A fresh instance is allocated for every cycle and shared by the target
/// tasks of that cycle only.
#[derive(Debug, Default)]
pub struct CycleStats {
    events_emitted: AtomicU64,
    targets_succeeded: AtomicU64,
    targets_failed: AtomicU64,
    targets_deferred: AtomicU64,
    targets_unreachable: AtomicU64,
}

/// Plain copy of `CycleStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStatsSnapshot {
    pub events_emitted: u64,
    pub targets_succeeded: u64,
    pub targets_failed: u64,
    /// Targets that hit the cycle deadline with data still pending.
    pub targets_deferred: u64,
    /// Targets whose connect attempt was refused or timed out.
    pub targets_unreachable: u64,
}

impl CycleStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.targets_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.targets_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deferred(&self) {
        self.targets_deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unreachable(&self) {
        self.targets_unreachable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_emitted(&self) -> u64 {
        self.events_emitted.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CycleStatsSnapshot {
        CycleStatsSnapshot {
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            targets_succeeded: self.targets_succeeded.load(Ordering::Relaxed),
            targets_failed: self.targets_failed.load(Ordering::Relaxed),
            targets_deferred: self.targets_deferred.load(Ordering::Relaxed),
            targets_unreachable: self.targets_unreachable.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_concurrent_increments() {
        let stats = Arc::new(CycleStats::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let stats = stats.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    stats.record_event();
                }
                stats.record_success();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.events_emitted, 800);
        assert_eq!(snapshot.targets_succeeded, 8);
        assert_eq!(snapshot.targets_failed, 0);
    }
}
