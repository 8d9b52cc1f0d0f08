//! eventlog-collector library crate.
//!
//! A remote-polling collector daemon: keeps a configuration mirror in sync
//! with a remote authority, polls a fleet of targets in bounded batches on a
//! scan cycle, classifies and recovers from transport failures, and emits
//! normalized events plus liveness heartbeats.

pub mod authority;
pub mod channel;
pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod scheduler;
pub mod services;
pub mod sink;

#[cfg(test)]
mod test_utils;

pub use context::CollectorContext;
pub use error::{Error, Result};
pub use services::Collector;
