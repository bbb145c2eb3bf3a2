//! Error types for parley

use thiserror::Error;

/// Generic text shown to end users for any failure that may succeed on retry.
pub const RETRY_MESSAGE: &str = "The assistant is temporarily unavailable. Please try again.";

/// Text shown to end users when their session can no longer be continued.
pub const NEW_SESSION_MESSAGE: &str = "Your session has ended. Please start a new conversation.";

/// The main error type for parley operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Validation errors (bad request or bad configuration)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Session id unknown, already ended, or already archived
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session exists but has been idle longer than the expiry window
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// The active store refuses new sessions
    #[error("Active session limit reached ({0})")]
    CapacityExceeded(usize),

    /// Retrieval collaborator failed
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Generation collaborator failed or timed out
    #[error("Generation error: {0}")]
    Generation(String),

    /// Archive sink failed
    #[error("Archive error: {0}")]
    Archive(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for parley operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the same request may succeed if the caller retries it unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Generation(_) | Error::Archive(_) | Error::CapacityExceeded(_)
        )
    }

    /// Whether the caller should continue in a fresh session
    pub fn starts_new_session(&self) -> bool {
        matches!(self, Error::SessionNotFound(_) | Error::SessionExpired(_))
    }

    /// Message safe to show to an end user. Internal causes stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation(msg) => msg.clone(),
            e if e.starts_new_session() => NEW_SESSION_MESSAGE.to_string(),
            _ => RETRY_MESSAGE.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Generation("timeout".into()).is_retryable());
        assert!(Error::Archive("disk full".into()).is_retryable());
        assert!(!Error::Validation("empty query".into()).is_retryable());
        assert!(!Error::SessionNotFound("abc".into()).is_retryable());
    }

    #[test]
    fn test_user_message_hides_internal_cause() {
        let err = Error::Generation("connection refused to 10.0.0.3:11434".into());
        assert_eq!(err.user_message(), RETRY_MESSAGE);

        let err = Error::SessionExpired("abc".into());
        assert!(err.starts_new_session());
        assert_eq!(err.user_message(), NEW_SESSION_MESSAGE);
    }
}
