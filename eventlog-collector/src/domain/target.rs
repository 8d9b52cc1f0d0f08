//! Polled targets and the active target set.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::attributes::{AttributeMap, attr_bool, attr_u64};
use crate::config::MAX_BATCH_SIZE;

/// Attribute toggling event log collection for a target.
pub const ATTR_ENABLED: &str = "zWinEventlog";
/// Attribute holding the minimum event type to collect (1 = error .. 5 = audit failure).
pub const ATTR_MIN_SEVERITY: &str = "zWinEventlogMinSeverity";
/// Attribute overriding the process-wide batch size for one target.
pub const ATTR_BATCH_SIZE: &str = "zWinEventlogBatchSize";

const DEFAULT_MIN_SEVERITY: u8 = 2;
const MAX_SEVERITY: u8 = 5;

/// A target as delivered by the remote authority, before derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub id: String,
    #[serde(default)]
    pub attributes: AttributeMap,
}

impl TargetSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: AttributeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Collector-relevant attributes of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetAttributes {
    pub enabled: bool,
    pub min_severity: u8,
    pub batch_size: Option<usize>,
}

impl Default for TargetAttributes {
    fn default() -> Self {
        Self {
            enabled: true,
            min_severity: DEFAULT_MIN_SEVERITY,
            batch_size: None,
        }
    }
}

impl TargetAttributes {
    fn from_map(id: &str, map: &AttributeMap) -> Self {
        let mut attrs = Self::default();

        if let Some(value) = map.get(ATTR_ENABLED) {
            match attr_bool(value) {
                Some(enabled) => attrs.enabled = enabled,
                None => warn!(target_id = %id, value = %value, "Ignoring malformed {}", ATTR_ENABLED),
            }
        }

        if let Some(value) = map.get(ATTR_MIN_SEVERITY) {
            match attr_u64(value) {
                Some(sev) if (1..=MAX_SEVERITY as u64).contains(&sev) => {
                    attrs.min_severity = sev as u8
                }
                _ => warn!(target_id = %id, value = %value, "Ignoring malformed {}", ATTR_MIN_SEVERITY),
            }
        }

        if let Some(value) = map.get(ATTR_BATCH_SIZE) {
            match attr_u64(value) {
                Some(size) if (1..=MAX_BATCH_SIZE as u64).contains(&size) => {
                    attrs.batch_size = Some(size as usize)
                }
                _ => warn!(target_id = %id, value = %value, "Ignoring malformed {}", ATTR_BATCH_SIZE),
            }
        }

        attrs
    }
}

/// Query descriptor derived from a target's attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDescriptor {
    pub min_severity: u8,
    pub query: String,
}

impl QueryDescriptor {
    fn for_attributes(attrs: &TargetAttributes) -> Self {
        Self {
            min_severity: attrs.min_severity,
            query: format!(
                "SELECT * FROM __InstanceCreationEvent where TargetInstance ISA 'Win32_NTLogEvent' and TargetInstance.EventType <= {}",
                attrs.min_severity
            ),
        }
    }
}

/// A remote endpoint being polled.
///
/// Immutable once built; a refreshed attribute set produces a new `Target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: String,
    pub attributes: TargetAttributes,
    pub query: QueryDescriptor,
}

impl Target {
    pub fn from_spec(spec: &TargetSpec) -> Self {
        let attributes = TargetAttributes::from_map(&spec.id, &spec.attributes);
        let query = QueryDescriptor::for_attributes(&attributes);
        Self {
            id: spec.id.clone(),
            attributes,
            query,
        }
    }

    /// Batch size for this target, falling back to the process-wide value.
    pub fn batch_size(&self, default: usize) -> usize {
        self.attributes.batch_size.unwrap_or(default)
    }
}

/// The authoritative set of active targets, ordered by id.
#[derive(Debug, Clone, Default)]
pub struct TargetSet {
    targets: Vec<Arc<Target>>,
}

impl TargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from authority specs.
    ///
    /// Disabled targets are dropped; for duplicate ids the first occurrence wins.
    pub fn from_specs(specs: &[TargetSpec]) -> Self {
        let mut seen = HashSet::with_capacity(specs.len());
        let mut targets: Vec<Arc<Target>> = Vec::with_capacity(specs.len());
        for spec in specs {
            if !seen.insert(spec.id.as_str()) {
                warn!(target_id = %spec.id, "Duplicate target in authority list, ignoring");
                continue;
            }
            let target = Target::from_spec(spec);
            if target.attributes.enabled {
                targets.push(Arc::new(target));
            }
        }
        targets.sort_by(|a, b| a.id.cmp(&b.id));
        Self { targets }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Target>> {
        self.targets
            .binary_search_by(|t| t.id.as_str().cmp(id))
            .ok()
            .map(|idx| &self.targets[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Target>> {
        self.targets.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|t| t.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl PartialEq for TargetSet {
    fn eq(&self, other: &Self) -> bool {
        self.targets.len() == other.targets.len()
            && self
                .targets
                .iter()
                .zip(other.targets.iter())
                .all(|(a, b)| a.as_ref() == b.as_ref())
    }
}

impl Eq for TargetSet {}
