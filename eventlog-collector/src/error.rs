//! Application-wide error types.

use thiserror::Error;

use crate::authority::AuthorityError;
use crate::channel::ChannelError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authority error: {0}")]
    Authority(#[from] AuthorityError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("cycle interval must be positive");
        assert_eq!(
            err.to_string(),
            "Configuration error: cycle interval must be positive"
        );

        let err: Error = AuthorityError::Unavailable("connection reset".into()).into();
        assert!(err.to_string().starts_with("Authority error:"));
    }
}
