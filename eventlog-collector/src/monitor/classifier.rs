//! Table-driven classification of channel failures.
//!
//! Classification is a pure function of the error: the same error always
//! yields the same kind, code, label and message.

use std::sync::OnceLock;

use regex::Regex;

use crate::channel::ChannelError;

/// Vendor status meaning "no new data, reconnect".
pub const STATUS_RECONNECT: u32 = 0x0000_06be;

/// How a failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Retry next cycle without raising an alarm.
    Transient,
    /// Tear down the session and reconnect next cycle without an alarm.
    Ignorable,
    /// Mark the target down for this cycle.
    Fatal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Ignorable => "ignorable",
            ErrorKind::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub code: Option<i64>,
    pub label: Option<&'static str>,
    pub message: Option<&'static str>,
}

impl Classification {
    fn bare(kind: ErrorKind) -> Self {
        Self {
            kind,
            code: None,
            label: None,
            message: None,
        }
    }

    /// Human-readable cause, if any code was recovered.
    pub fn describe(&self) -> Option<String> {
        match (self.code, self.label, self.message) {
            (Some(code), Some(label), Some(message)) => {
                Some(format!("{}: {} ({})", label, message, code))
            }
            (Some(code), _, _) => Some(format!(
                "Could not map the error code {} to a com_error",
                code
            )),
            _ => None,
        }
    }
}

struct CodeEntry {
    code: i64,
    label: &'static str,
    message: &'static str,
    kind: ErrorKind,
}

const CODE_TABLE: &[CodeEntry] = &[
    CodeEntry {
        code: -2147023174,
        label: "RPC_S_SERVER_UNAVAILABLE",
        message: "The RPC server is unavailable",
        kind: ErrorKind::Transient,
    },
    CodeEntry {
        code: -2147209215,
        label: "WBEM_E_TIMED_OUT",
        message: "The operation timed out",
        kind: ErrorKind::Transient,
    },
    CodeEntry {
        code: -2147023170,
        label: "RPC_S_CALL_FAILED",
        message: "The remote procedure call failed",
        kind: ErrorKind::Ignorable,
    },
    CodeEntry {
        code: -2147024891,
        label: "E_ACCESSDENIED",
        message: "Access is denied",
        kind: ErrorKind::Fatal,
    },
    CodeEntry {
        code: -2147217405,
        label: "WBEM_E_ACCESS_DENIED",
        message: "The current user does not have permission to perform the action",
        kind: ErrorKind::Fatal,
    },
    CodeEntry {
        code: -2147217406,
        label: "WBEM_E_NOT_FOUND",
        message: "The object was not found",
        kind: ErrorKind::Fatal,
    },
    CodeEntry {
        code: -2147217385,
        label: "WBEM_E_INVALID_QUERY",
        message: "The query was not syntactically valid",
        kind: ErrorKind::Fatal,
    },
    CodeEntry {
        code: -2147217392,
        label: "WBEM_E_INVALID_CLASS",
        message: "The specified class is not valid",
        kind: ErrorKind::Fatal,
    },
];

fn com_error_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"com_error\((-?[0-9]+)\s*[,)]").expect("valid com_error pattern"))
}

/// Maps channel failures to a handling kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a channel error.
    pub fn classify(&self, error: &ChannelError) -> Classification {
        match error {
            ChannelError::ConnectionRefused(_) | ChannelError::Timeout(_) => {
                Classification::bare(ErrorKind::Transient)
            }
            ChannelError::Status { code, .. } if *code == STATUS_RECONNECT => {
                Classification::bare(ErrorKind::Ignorable)
            }
            other => self.classify_text(&other.to_string()),
        }
    }

    /// Classify from an error's textual form by recovering an embedded code.
    pub fn classify_text(&self, text: &str) -> Classification {
        let Some(code) = extract_code(text) else {
            return Classification::bare(ErrorKind::Fatal);
        };

        match CODE_TABLE.iter().find(|entry| entry.code == code) {
            Some(entry) => Classification {
                kind: entry.kind,
                code: Some(code),
                label: Some(entry.label),
                message: Some(entry.message),
            },
            None => Classification {
                kind: ErrorKind::Fatal,
                code: Some(code),
                label: None,
                message: None,
            },
        }
    }
}

fn extract_code(text: &str) -> Option<i64> {
    com_error_regex()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
