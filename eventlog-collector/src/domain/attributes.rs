//! Loosely-typed attribute maps delivered by the remote authority.

use std::collections::HashMap;

use serde_json::Value;

/// Attribute map as delivered by the remote authority.
pub type AttributeMap = HashMap<String, Value>;

/// Read an unsigned integer attribute.
///
/// Accepts JSON numbers and numeric strings; anything else yields `None`.
pub fn attr_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a boolean attribute.
///
/// Accepts JSON booleans, `0`/`1`, and the strings `true`/`false`/`yes`/`no`.
pub fn attr_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_u64().and_then(|v| match v {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
