//! Remote configuration authority.
//!
//! The authority owns the process-level attributes and the list of targets
//! assigned to this collector. The collector only ever reads from it.

mod file;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{AttributeMap, TargetSpec};

pub use file::FileAuthority;

/// Error raised by a remote authority call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorityError {
    #[error("authority unavailable: {0}")]
    Unavailable(String),

    #[error("authority call timed out")]
    Timeout,

    #[error("malformed authority response: {0}")]
    Malformed(String),
}

/// Capability for fetching configuration from the remote authority.
#[async_trait]
pub trait RemoteAuthority: Send + Sync + 'static {
    /// Fetch the process-level attribute map.
    async fn get_process_config(&self) -> Result<AttributeMap, AuthorityError>;

    /// Fetch the targets assigned to `selector` (the collector's monitor name).
    async fn get_target_list(&self, selector: &str) -> Result<Vec<TargetSpec>, AuthorityError>;
}
