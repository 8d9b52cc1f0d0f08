//! Conversion of raw records into normalized events.

use chrono::Utc;
use tracing::trace;

use crate::context::CollectorContext;
use crate::domain::{NormalizedEvent, RawRecord, Severity, Target};
use crate::scheduler::CycleStats;

/// Summary used when a record carries no message text.
pub const DEFAULT_MESSAGE: &str =
    "Message text from Windows not available.  See source system's event log.";

/// Builds normalized events and forwards them to the event sink.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    ctx: CollectorContext,
}

impl EventEmitter {
    pub fn new(ctx: CollectorContext) -> Self {
        Self { ctx }
    }

    /// Normalize `record`, count it against `stats` and send it to the sink.
    pub fn emit(&self, stats: &CycleStats, target: &Target, record: RawRecord) {
        let event = self.normalize(target, record);
        trace!(target_id = %target.id, key = %event.key, "Emitting event");
        stats.record_event();
        self.ctx.events().accept(event);
    }

    /// Build the normalized form of `record` without emitting it.
    pub fn normalize(&self, target: &Target, record: RawRecord) -> NormalizedEvent {
        let key = format!("{}_{}", record.source_name, record.event_code);
        let summary = summary_for(record.message.as_deref());

        NormalizedEvent {
            device_id: target.id.clone(),
            key,
            severity: Severity::from_event_type(record.event_type),
            summary,
            timestamp: Utc::now(),
            source_component: record.source_name,
            event_group: Some(record.log_file),
            event_id: Some(record.event_code),
            agent: self.ctx.agent().to_string(),
            monitor: self.ctx.monitor().to_string(),
            user: record.user,
            category: record.category_string,
            computer_name: record.computer_name,
            event_identifier: record.event_identifier,
            original_time: Some(format_original_time(&record.time_generated)),
        }
    }
}

fn summary_for(message: Option<&str>) -> String {
    match message.map(str::trim) {
        Some(text) if !text.is_empty() && text != "None" => text.to_string(),
        _ => DEFAULT_MESSAGE.to_string(),
    }
}

/// Reformat `YYYYMMDDhhmmss...` as `YYYY/MM/DD hh:mm:ss`.
///
/// Values that are too short (or not ASCII) are returned unchanged.
fn format_original_time(raw: &str) -> String {
    match (raw.get(0..4), raw.get(4..6), raw.get(6..8)) {
        (Some(y), Some(mo), Some(d)) => match (raw.get(8..10), raw.get(10..12), raw.get(12..14)) {
            (Some(h), Some(mi), Some(s)) => format!("{}/{}/{} {}:{}:{}", y, mo, d, h, mi, s),
            _ => raw.to_string(),
        },
        _ => raw.to_string(),
    }
}
