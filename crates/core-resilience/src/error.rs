//! Error types for resilience operations

use std::time::Duration;
use thiserror::Error;

/// Errors raised by a guarded upstream call
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResilienceError {
    /// Transient error that may be retried
    #[error("Transient error: {0}")]
    Transient(String),

    /// Permanent error that should not be retried
    #[error("Permanent error: {0}")]
    Permanent(String),

    /// Timeout occurred
    #[error("Operation timeout after {0:?}")]
    Timeout(Duration),

    /// The surrounding work was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Maximum retries exceeded
    #[error("Maximum retries ({attempts}) exceeded: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl ResilienceError {
    /// Shorthand for a transient failure
    pub fn transient(msg: impl Into<String>) -> Self {
        ResilienceError::Transient(msg.into())
    }

    /// Shorthand for a permanent failure
    pub fn permanent(msg: impl Into<String>) -> Self {
        ResilienceError::Permanent(msg.into())
    }

    /// Check if this error is transient and can be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ResilienceError::Transient(_) | ResilienceError::Timeout(_)
        )
    }

    /// Check if this error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ResilienceError::Permanent(_) | ResilienceError::MaxRetriesExceeded { .. }
        )
    }
}

impl From<std::io::Error> for ResilienceError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::TimedOut
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock => ResilienceError::Transient(err.to_string()),
            _ => ResilienceError::Permanent(err.to_string()),
        }
    }
}
