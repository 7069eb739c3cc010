//! Error types for termrun.

use thiserror::Error;

use crate::SessionId;

/// Main error type for termrun operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Session not found (unknown or already closed)
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Session already ran (or is running) a process
    #[error("Session {0} is not idle")]
    SessionBusy(SessionId),

    /// Session limit reached
    #[error("Session limit reached (max: {0})")]
    SessionLimitReached(usize),

    /// No interpreter registered for the language tag
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// The interpreter process could not be started
    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    /// PTY-related errors
    #[error("PTY error: {0}")]
    Pty(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input or parameters (generic)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error happened before any process was started.
    ///
    /// Configuration and spawn failures are reported to callers as
    /// completion-shaped results rather than propagated.
    pub fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedLanguage(_) | Error::Spawn(_) | Error::Pty(_)
        )
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
