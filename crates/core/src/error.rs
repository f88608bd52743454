// Error handling for session control operations

use std::fmt;

/// Errors surfaced by the session controller's public API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// Caller-supplied argument out of range (empty path, seek past the end)
    InvalidArgument(String),

    /// Operation has no meaning in the current session state
    InvalidState(String),

    /// A bounded wait elapsed without the matching pipeline event
    Timeout(String),

    /// The pipeline reported an operation failure
    PipelineFault(String),

    /// The close sequence was never acknowledged; there is no recovery path
    Unrecoverable(String),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ControlError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            ControlError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            ControlError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            ControlError::PipelineFault(msg) => write!(f, "Pipeline fault: {}", msg),
            ControlError::Unrecoverable(msg) => write!(f, "Unrecoverable: {}", msg),
        }
    }
}

impl std::error::Error for ControlError {}

/// Result type alias for control operations
pub type Result<T> = std::result::Result<T, ControlError>;
