//! Error types for the sync engine.

use notebook_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during a sync cycle.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No stored session, or the stored blob is unreadable.
    #[error("no session credential stored")]
    AuthenticationMissing,

    /// A session is stored but every cookie in it has expired.
    #[error("session credential expired")]
    AuthenticationExpired,

    /// Pull was rejected by the server or never reached it.
    #[error("pull failed{}: {message}", status_suffix(.status))]
    PullFailed {
        /// HTTP status, `None` for transport failures.
        status: Option<u16>,
        /// Response body or transport error.
        message: String,
    },

    /// The local store rejected the pulled changeset.
    #[error("apply failed: {0}")]
    ApplyFailed(String),

    /// Push was rejected by the server or never reached it.
    #[error("push failed{}: {message}", status_suffix(.status))]
    PushFailed {
        /// HTTP status, `None` for transport failures.
        status: Option<u16>,
        /// Response body or transport error.
        message: String,
    },

    /// Malformed message.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Local storage error (credential storage or store snapshot).
    #[error("storage error: {0}")]
    Storage(String),

    /// Another cycle is already running.
    #[error("sync already in progress")]
    AlreadyRunning,

    /// Unexpected failure.
    #[error("internal error: {0}")]
    Internal(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl SyncError {
    /// Creates a pull failure from a non-success HTTP response.
    pub fn pull_status(status: u16, body: impl Into<String>) -> Self {
        Self::PullFailed {
            status: Some(status),
            message: body.into(),
        }
    }

    /// Creates a pull failure from a transport error.
    pub fn pull_transport(message: impl Into<String>) -> Self {
        Self::PullFailed {
            status: None,
            message: message.into(),
        }
    }

    /// Creates a push failure from a non-success HTTP response.
    pub fn push_status(status: u16, body: impl Into<String>) -> Self {
        Self::PushFailed {
            status: Some(status),
            message: body.into(),
        }
    }

    /// Creates a push failure from a transport error.
    pub fn push_transport(message: impl Into<String>) -> Self {
        Self::PushFailed {
            status: None,
            message: message.into(),
        }
    }

    /// Returns true if no usable credential was found.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            SyncError::AuthenticationMissing | SyncError::AuthenticationExpired
        )
    }

    /// Returns true if running another cycle later may succeed without
    /// user action.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::PullFailed { status, .. } | SyncError::PushFailed { status, .. } => {
                status.is_none_or(|s| s >= 500 || s == 408 || s == 429)
            }
            SyncError::AlreadyRunning => true,
            _ => false,
        }
    }

    /// Short human-readable text for the caller's status surface.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::AuthenticationMissing | SyncError::AuthenticationExpired => {
                "sign in required".to_string()
            }
            SyncError::PullFailed { status, message } => {
                format!("Pull failed{}: {}", status_suffix(status), message)
            }
            SyncError::PushFailed { status, message } => {
                format!("Push failed{}: {}", status_suffix(status), message)
            }
            SyncError::ApplyFailed(message) => format!("Apply failed: {message}"),
            SyncError::AlreadyRunning => "sync already in progress".to_string(),
            SyncError::Protocol(e) => format!("Sync failed: {e}"),
            SyncError::Storage(message) => format!("Storage error: {message}"),
            SyncError::Internal(message) => format!("Sync failed: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::pull_transport("connection refused").is_retryable());
        assert!(SyncError::push_status(503, "down").is_retryable());
        assert!(SyncError::push_status(429, "slow down").is_retryable());
        assert!(!SyncError::push_status(409, "pull first").is_retryable());
        assert!(!SyncError::AuthenticationExpired.is_retryable());
        assert!(!SyncError::ApplyFailed("constraint".into()).is_retryable());
    }

    #[test]
    fn user_messages() {
        assert_eq!(
            SyncError::AuthenticationMissing.user_message(),
            "sign in required"
        );
        assert_eq!(
            SyncError::push_status(500, "boom").user_message(),
            "Push failed (500): boom"
        );
        assert_eq!(
            SyncError::pull_transport("timed out").user_message(),
            "Pull failed: timed out"
        );
    }

    #[test]
    fn error_display() {
        let err = SyncError::pull_status(401, "unauthorized");
        assert_eq!(err.to_string(), "pull failed (401): unauthorized");
        assert!(SyncError::AuthenticationExpired.is_auth_error());
        assert!(!err.is_auth_error());
    }
}
