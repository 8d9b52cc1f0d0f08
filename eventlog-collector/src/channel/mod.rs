//! Transport capability used to reach polled targets.
//!
//! A channel hands out sessions (live connections) and fetches bounded batches
//! of records through them. Read position is owned by the channel, so a batch
//! fetched after a reconnect continues where the previous session stopped.

mod spool;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{RawRecord, Target};

pub use spool::{SpoolChannel, SpoolSession};

/// Error raised by a channel operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// A vendor status code reported directly by the transport.
    #[error("status 0x{code:08x}: {message}")]
    Status { code: u32, message: String },

    /// Any other failure; the text may embed a `com_error(<code>)` marker.
    #[error("{0}")]
    Remote(String),
}

impl ChannelError {
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }
}

/// Capability for connecting to a target and pulling record batches.
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    /// Live connection handle, owned by exactly one watcher.
    type Session: Send + 'static;

    /// Open a session to `target`.
    async fn connect(&self, target: &Target, timeout: Duration)
    -> Result<Self::Session, ChannelError>;

    /// Fetch at most `max_count` records. An empty batch means no new data.
    async fn fetch_batch(
        &self,
        session: &mut Self::Session,
        timeout: Duration,
        max_count: usize,
    ) -> Result<Vec<RawRecord>, ChannelError>;

    /// Tear down a session.
    async fn close(&self, session: Self::Session) {
        drop(session);
    }
}
