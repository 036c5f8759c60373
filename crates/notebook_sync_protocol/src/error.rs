//! Error types for protocol validation and decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while validating or decoding protocol messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A record in a changeset has no string `id` field.
    #[error("record without id in table {table}")]
    MissingId {
        /// Table the record belongs to.
        table: String,
    },

    /// A record id appears in more than one list of the same table.
    #[error("record {id} appears more than once in table {table}")]
    DuplicateRecord {
        /// Table name.
        table: String,
        /// Offending record id.
        id: String,
    },

    /// Migration steps do not form a contiguous ascending chain.
    #[error("invalid migration: {0}")]
    InvalidMigration(String),

    /// Cursor went backwards.
    #[error("cursor regression: requested {requested}, got {returned}")]
    CursorRegression {
        /// Cursor sent in the request.
        requested: i64,
        /// Cursor returned by the server.
        returned: i64,
    },

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::DuplicateRecord {
            table: "notes".into(),
            id: "n1".into(),
        };
        assert_eq!(
            err.to_string(),
            "record n1 appears more than once in table notes"
        );

        let err = ProtocolError::CursorRegression {
            requested: 10,
            returned: 5,
        };
        assert!(err.to_string().contains("10"));
        assert!(err.to_string().contains("5"));
    }
}
