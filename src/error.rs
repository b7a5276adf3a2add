//! Error types for the console pipeline
//!
//! Only construction, configuration and thread management can fail. The
//! producer and drain paths never surface errors: producers get a `bool`,
//! sinks degrade silently.

use std::io;
use thiserror::Error;

/// Reasons a [`Config`](crate::Config) is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The transfer queue must hold at least one message
    #[error("queue depth must be at least 1")]
    ZeroQueueDepth,
    /// The drain thread needs a non-zero stack
    #[error("drain thread stack size must be non-zero")]
    ZeroTaskStack,
    /// File logging is enabled but no path was given
    #[error("file logging is enabled but the log path is empty")]
    EmptyFilePath,
    /// File logging is enabled with a zero rotation threshold
    #[error("file logging is enabled but max file size is 0")]
    ZeroMaxFileSize,
}

/// Errors returned by the console's fallible operations
#[derive(Debug, Error)]
pub enum Error {
    /// The supplied configuration is invalid
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The drain thread could not be spawned
    #[error("failed to spawn drain thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Result type for console operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_config_error_converts() {
        let err: Error = ConfigError::ZeroQueueDepth.into();
        assert!(matches!(err, Error::Config(ConfigError::ZeroQueueDepth)));
        assert_eq!(err.to_string(), "invalid configuration: queue depth must be at least 1");
    }

    #[test]
    fn test_spawn_error_keeps_source() {
        let err = Error::Spawn(io::Error::new(io::ErrorKind::OutOfMemory, "no stack"));
        assert_eq!(err.to_string(), "failed to spawn drain thread: no stack");
        assert!(err.source().is_some());
    }
}
