//! Service layer module.
//!
//! Provides the collector container that wires all components together.

pub mod container;

pub use container::Collector;
