//! Error handling module for the installer
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Every fatal path of a run is represented here; declining at the
//! confirmation gate is not an error and is reported through `RunOutcome`.

use thiserror::Error;

use crate::fields::FieldId;
use crate::resolver::ValueSource;
use crate::run_state::RunTransitionError;

/// Main error type for the installer
#[derive(Error, Debug)]
pub enum InstallerError {
    /// Required external tools are not on PATH
    #[error("Missing required tools: {}", .0.join(", "))]
    MissingDependency(Vec<String>),

    /// A field value does not match its validation pattern
    #[error("Invalid value for --{field} (from {origin}): {reason}")]
    Validation {
        field: FieldId,
        origin: ValueSource,
        reason: String,
    },

    /// A required field has no value in non-interactive mode
    #[error("Missing required value for --{0} (set the flag or the {env} environment variable)", env = .0.env_var())]
    MissingValue(FieldId),

    /// The target cluster cannot be reached
    #[error("Cannot reach the Kubernetes cluster: {0}")]
    Connectivity(String),

    /// helm returned a non-zero exit status
    #[error("Install failed: {0}")]
    Install(String),

    /// Template substitution or structural validation failed
    #[error("Render error: {0}")]
    Render(String),

    /// Controlling terminal unavailable or unreadable
    #[error("Terminal error: {0}")]
    Terminal(String),

    /// Run state machine transition errors
    #[error("Run transition error: {0}")]
    Transition(#[from] RunTransitionError),

    /// IO errors (file operations, subprocess spawn)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for installer operations
pub type Result<T> = std::result::Result<T, InstallerError>;

// Convenient error constructors
impl InstallerError {
    /// Create a validation error
    pub fn validation(field: FieldId, origin: ValueSource, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            origin,
            reason: reason.into(),
        }
    }

    /// Create a connectivity error
    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    /// Create an install error
    pub fn install(msg: impl Into<String>) -> Self {
        Self::Install(msg.into())
    }

    /// Create a render error
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Create a terminal error
    pub fn terminal(msg: impl Into<String>) -> Self {
        Self::Terminal(msg.into())
    }
}
