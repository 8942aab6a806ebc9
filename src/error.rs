#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use thiserror::Error;

/// Error code constants for type-safe error handling
pub mod code {
    pub const INVALID: &str = "INVALID";
    pub const CONFLICT: &str = "CONFLICT";
    pub const DEPENDENCY: &str = "DEPENDENCY";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const INTERNAL: &str = "INTERNAL";
}

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Consistency error: {0}")]
    ConsistencyError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MirrorError {
    /// Returns the stable error code for this error
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) | Self::MalformedMessage(_) | Self::SerializationError(_) => {
                code::INVALID
            }
            Self::TransportError(_) | Self::IoError(_) => code::DEPENDENCY,
            Self::Timeout(_) => code::TIMEOUT,
            Self::ConsistencyError(_) => code::CONFLICT,
            Self::Internal(_) => code::INTERNAL,
        }
    }

    /// Returns the exit code for this error
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigError(_) => 2,
            Self::TransportError(_) => 3,
            Self::Timeout(_) => 4,
            Self::MalformedMessage(_) => 5,
            Self::ConsistencyError(_) => 6,
            Self::IoError(_) => 7,
            Self::SerializationError(_) => 8,
            Self::Internal(_) => 9,
        }
    }

    /// Transport-class errors are recovered by the reconnect machine.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::TransportError(_) | Self::Timeout(_) | Self::IoError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;
