//! Error types for the sync server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use notebook_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
///
/// Every variant maps to an HTTP status; the response body is the
/// plain-text display of the error.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Missing, forged, or expired session.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// A pushed record changed on the server after the client's last pull.
    #[error("conflict: {table}/{id} changed since {last_pulled_at}, pull first")]
    Conflict {
        /// Table of the first conflicting record.
        table: String,
        /// Id of the first conflicting record.
        id: String,
        /// Cursor the push was based on.
        last_pulled_at: i64,
    },

    /// Push larger than the configured limit.
    #[error("push too large: {count} records, limit {max}")]
    PayloadTooLarge {
        /// Records in the push.
        count: usize,
        /// Configured limit.
        max: usize,
    },

    /// Feature not enabled on this server.
    #[error("not found: {0}")]
    NotFound(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns the HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotAuthorized(_) => StatusCode::UNAUTHORIZED,
            ServerError::Conflict { .. } => StatusCode::CONFLICT,
            ServerError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Internal(_) | ServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }
}

impl From<ProtocolError> for ServerError {
    fn from(error: ProtocolError) -> Self {
        ServerError::InvalidRequest(error.to_string())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, %status, "request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
        assert_eq!(
            ServerError::PayloadTooLarge { count: 5, max: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn conflict_display() {
        let err = ServerError::Conflict {
            table: "notes".into(),
            id: "a".into(),
            last_pulled_at: 10,
        };
        assert_eq!(err.status(), StatusCode::CONFLICT);
        let msg = err.to_string();
        assert!(msg.contains("notes/a"));
        assert!(msg.contains("10"));
    }

    #[test]
    fn protocol_errors_are_bad_requests() {
        let err: ServerError = ProtocolError::MissingId {
            table: "notes".into(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
