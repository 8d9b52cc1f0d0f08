//! Failure classification and event emission.

mod classifier;
mod emitter;

pub use classifier::{Classification, ErrorClassifier, ErrorKind, STATUS_RECONNECT};
pub use emitter::{DEFAULT_MESSAGE, EventEmitter};
