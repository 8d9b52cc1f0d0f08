//! Polled records, normalized events and liveness records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw event log record as returned by a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRecord {
    pub source_name: String,
    pub event_code: u32,
    /// Vendor event type: 1 = error, 2 = warning, 3 = information,
    /// 4 = audit success, 5 = audit failure.
    pub event_type: u8,
    pub message: Option<String>,
    pub log_file: String,
    pub user: Option<String>,
    pub category_string: Option<String>,
    pub computer_name: Option<String>,
    pub event_identifier: Option<u64>,
    /// Vendor timestamp, `YYYYMMDDhhmmss.ffffff+zzz`.
    pub time_generated: String,
}

/// Normalized event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Map a vendor event type to a severity.
    ///
    /// Types 3, 4 and 5 collapse to `Info`; unknown types map to `Debug`.
    pub fn from_event_type(event_type: u8) -> Self {
        match event_type {
            1 => Severity::Error,
            2 => Severity::Warning,
            3..=5 => Severity::Info,
            _ => Severity::Debug,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event forwarded to the event sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub device_id: String,
    pub key: String,
    pub severity: Severity,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
    pub source_component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<u32>,
    pub agent: String,
    pub monitor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_identifier: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_time: Option<String>,
}

impl NormalizedEvent {
    /// Build an event raised by the collector itself rather than read from a target.
    pub fn internal(
        device_id: impl Into<String>,
        key: impl Into<String>,
        severity: Severity,
        summary: impl Into<String>,
        agent: &str,
        monitor: &str,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            key: key.into(),
            severity,
            summary: summary.into(),
            timestamp: Utc::now(),
            source_component: agent.to_string(),
            event_group: None,
            event_id: None,
            agent: agent.to_string(),
            monitor: monitor.to_string(),
            user: None,
            category: None,
            computer_name: None,
            event_identifier: None,
            original_time: None,
        }
    }
}

/// Liveness record for external dead-process detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub component: String,
    pub device: String,
    pub timeout_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_mapping() {
        assert_eq!(Severity::from_event_type(1), Severity::Error);
        assert_eq!(Severity::from_event_type(2), Severity::Warning);
        assert_eq!(Severity::from_event_type(3), Severity::Info);
        assert_eq!(Severity::from_event_type(4), Severity::Info);
        assert_eq!(Severity::from_event_type(5), Severity::Info);
        assert_eq!(Severity::from_event_type(0), Severity::Debug);
        assert_eq!(Severity::from_event_type(9), Severity::Debug);
    }

    #[test]
    fn test_raw_record_partial_json() {
        let record: RawRecord =
            serde_json::from_str(r#"{"source_name":"Service Control Manager","event_code":7036}"#)
                .unwrap();
        assert_eq!(record.source_name, "Service Control Manager");
        assert_eq!(record.event_code, 7036);
        assert_eq!(record.event_type, 0);
        assert!(record.message.is_none());
    }

    #[test]
    fn test_event_serialization() {
        let event = NormalizedEvent::internal(
            "host-a",
            "connection_issue",
            Severity::Error,
            "down",
            "zeneventlog",
            "localhost",
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"severity\":\"error\""));
        assert!(!json.contains("event_group"));
    }
}
