//! Error types for the rover camera service.
//!
//! All errors implement the `std::error::Error` trait and map onto the HTTP
//! surface in one place (the server layer): resource and encode failures
//! become 500 responses, command-parse failures become 404, and a transport
//! failure simply ends the streaming response.
//!
//! No error is retried automatically anywhere in the core; failure handling
//! is local fail-fast with resource cleanup by ownership.
//!
//! ## Helper Constructors
//!
//! Use helper methods for common error scenarios:
//!
//! ```rust
//! use rovercam::RoverError;
//!
//! let err = RoverError::encode("frame buffer shorter than width * height");
//! assert!(!err.is_retryable());
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for rover camera operations.
pub type Result<T, E = RoverError> = std::result::Result<T, E>;

/// Main error type for the rover camera service.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RoverError {
    /// The frame source had no frame to hand out.
    #[error("camera produced no frame")]
    FrameUnavailable,

    /// JPEG transcoding or compression failed.
    #[error("JPEG encode failed: {reason}")]
    Encode { reason: String },

    /// The peer went away mid-response; ends the stream, surfaces nothing.
    #[error("transport closed during {context}")]
    Transport { context: String },

    /// The sensor rejected a configuration value.
    #[error("sensor rejected {setting}: {reason}")]
    Sensor { setting: String, reason: String },

    /// A control request named a variable the command table does not know.
    #[error("unknown control variable '{name}'")]
    UnknownVariable { name: String },

    /// Configuration file could not be read or parsed.
    #[error("configuration error in {path}")]
    Config {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// I/O failure outside the streaming path (listener bind, config read).
    #[error("I/O error during {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

impl RoverError {
    /// Returns whether a later, identical request could plausibly succeed.
    ///
    /// The core never retries internally; this classification exists for
    /// callers that drive their own retry policy (a reconnecting client,
    /// a supervisor restarting the service).
    pub fn is_retryable(&self) -> bool {
        match self {
            RoverError::FrameUnavailable => true,
            RoverError::Transport { .. } => true,
            RoverError::Io { .. } => true,
            RoverError::Encode { .. } => false,
            RoverError::Sensor { .. } => false,
            RoverError::UnknownVariable { .. } => false,
            RoverError::Config { .. } => false,
        }
    }

    /// Helper constructor for encode failures.
    pub fn encode(reason: impl Into<String>) -> Self {
        RoverError::Encode { reason: reason.into() }
    }

    /// Helper constructor for transport failures with write context.
    pub fn transport(context: impl Into<String>) -> Self {
        RoverError::Transport { context: context.into() }
    }

    /// Helper constructor for sensor configuration rejections.
    pub fn sensor(setting: impl Into<String>, reason: impl Into<String>) -> Self {
        RoverError::Sensor { setting: setting.into(), reason: reason.into() }
    }

    /// Helper constructor for unknown control variables.
    pub fn unknown_variable(name: impl Into<String>) -> Self {
        RoverError::UnknownVariable { name: name.into() }
    }

    /// Helper constructor for configuration errors with file context.
    pub fn config(
        path: impl Into<PathBuf>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        RoverError::Config { path: path.into(), source: Box::new(source) }
    }

    /// Helper constructor for I/O errors with operation context.
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        RoverError::Io { operation: operation.into(), source }
    }
}
