use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoginError {
    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Failed to launch {path}: {message}")]
    ProcessLaunchFailure { path: String, message: String },

    #[error("Command `{command}` failed: {message}")]
    CommandExecutionFailure { command: String, message: String },

    #[error("WebDriver error ({error}): {message}")]
    Driver { error: String, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid secret: {0}")]
    InvalidSecret(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error kind, safe to log without leaking any detail of the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    SessionUnavailable,
    ProcessLaunchFailure,
    CommandExecutionFailure,
    Driver,
    Transport,
    InvalidSecret,
    InvalidConfig,
    Io,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::SessionUnavailable => "SessionUnavailable",
            ErrorCategory::ProcessLaunchFailure => "ProcessLaunchFailure",
            ErrorCategory::CommandExecutionFailure => "CommandExecutionFailure",
            ErrorCategory::Driver => "DriverError",
            ErrorCategory::Transport => "TransportError",
            ErrorCategory::InvalidSecret => "InvalidSecret",
            ErrorCategory::InvalidConfig => "InvalidConfig",
            ErrorCategory::Io => "IoError",
        };
        f.write_str(name)
    }
}

impl LoginError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LoginError::SessionUnavailable(_) => ErrorCategory::SessionUnavailable,
            LoginError::ProcessLaunchFailure { .. } => ErrorCategory::ProcessLaunchFailure,
            LoginError::CommandExecutionFailure { .. } => ErrorCategory::CommandExecutionFailure,
            LoginError::Driver { .. } => ErrorCategory::Driver,
            LoginError::Transport(_) => ErrorCategory::Transport,
            LoginError::InvalidSecret(_) => ErrorCategory::InvalidSecret,
            LoginError::InvalidConfig(_) => ErrorCategory::InvalidConfig,
            LoginError::Io(_) => ErrorCategory::Io,
        }
    }

    /// True when the automated window or the whole session has gone away.
    pub fn is_session_unavailable(&self) -> bool {
        matches!(self, LoginError::SessionUnavailable(_))
    }
}
