//! Domain types shared by the collector components.

mod attributes;
mod event;
mod target;

pub use attributes::{AttributeMap, attr_bool, attr_u64};
pub use event::{Heartbeat, NormalizedEvent, RawRecord, Severity};
pub use target::{
    ATTR_BATCH_SIZE, ATTR_ENABLED, ATTR_MIN_SEVERITY, QueryDescriptor, Target, TargetAttributes,
    TargetSet, TargetSpec,
};
