//! Error types for pathtrigger.
//!
//! All errors are strongly typed using thiserror. The taxonomy separates
//! channel faults (which end a triggering session) from per-constraint
//! failures (which are reported and skipped).

use thiserror::Error;

/// Errors raised by the control channel to the remote instance.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Control channel is disconnected")]
    Disconnected,

    #[error("Control channel I/O fault: {message}")]
    Io {
        message: String,
    },

    #[error("A query is already in flight on this channel")]
    QueryInProgress,
}

/// Per-constraint failures during input synthesis.
#[derive(Debug, Error)]
pub enum ConstraintError {
    #[error("Constraints not satisfiable for program '{program}'")]
    Unsatisfiable {
        program: String,
    },

    #[error("Solver error: {message}")]
    Solver {
        message: String,
    },

    #[error("Unknown constraint type '{tag}'")]
    UnknownConstraintType {
        tag: String,
    },

    #[error("Constraint is missing required metadata '{field}'")]
    MissingMetadata {
        field: String,
    },
}

/// Failures from the device-control collaborator (adb).
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Failed to spawn '{command}': {message}")]
    Spawn {
        command: String,
        message: String,
    },

    #[error("Command '{command}' failed: {stderr}")]
    CommandFailed {
        command: String,
        stderr: String,
    },

    #[error("Unexpected device output: {message}")]
    UnexpectedOutput {
        message: String,
    },
}

/// Top-level error type for pathtrigger.
///
/// This enum encompasses all possible errors that can occur while driving
/// a triggering session.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("No correlated reply within {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Constraint error: {0}")]
    Constraint(#[from] ConstraintError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Descriptor error: {message}")]
    Descriptor {
        message: String,
    },

    #[error("Invalid session state: {message}")]
    State {
        message: String,
    },
}

impl TriggerError {
    /// Creates a descriptor loading/parsing error.
    #[must_use]
    pub fn descriptor(message: impl Into<String>) -> Self {
        Self::Descriptor {
            message: message.into(),
        }
    }

    /// Creates a session-state error.
    #[must_use]
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Returns true if this is a channel error.
    #[must_use]
    pub const fn is_channel(&self) -> bool {
        matches!(self, Self::Channel(_))
    }

    /// Returns true if this is a per-constraint error.
    #[must_use]
    pub const fn is_constraint(&self) -> bool {
        matches!(self, Self::Constraint(_))
    }

    /// Returns true if this error aborts the whole event chain.
    ///
    /// Channel loss and reply timeouts end the triggering session;
    /// everything else is contained at the per-constraint boundary.
    #[must_use]
    pub const fn is_chain_fatal(&self) -> bool {
        matches!(self, Self::Channel(_) | Self::Timeout { .. })
    }
}

/// Result type alias for pathtrigger operations.
pub type TriggerResult<T> = Result<T, TriggerError>;
