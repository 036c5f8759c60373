//! Protocol messages for sync.
//!
//! - `GET /sync/pull?last_pulled_at=&schema_version=&migration=` answers
//!   with a [`PullResponse`]
//! - `POST /sync/push` carries a [`PushRequest`] body

use crate::changeset::Changeset;
use crate::cursor::{Cursor, SchemaVersion};
use crate::error::{ProtocolError, ProtocolResult};
use crate::migration::{MigrationDescriptor, MigrationStep};
use serde::{Deserialize, Serialize};

/// Pull request from client.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequest {
    /// Cursor to pull from; `None` requests a full pull.
    pub last_pulled_at: Option<Cursor>,
    /// Local schema version.
    pub schema_version: SchemaVersion,
    /// Migration range, present only when the local schema lags.
    pub migration: Option<MigrationDescriptor>,
}

impl PullRequest {
    /// Creates a new pull request without a migration.
    pub fn new(last_pulled_at: Option<Cursor>, schema_version: SchemaVersion) -> Self {
        Self {
            last_pulled_at,
            schema_version,
            migration: None,
        }
    }

    /// Attaches a migration descriptor.
    pub fn with_migration(mut self, migration: Option<MigrationDescriptor>) -> Self {
        self.migration = migration;
        self
    }

    /// Encodes to query-string form.
    pub fn to_query(&self) -> ProtocolResult<PullQuery> {
        Ok(PullQuery {
            last_pulled_at: self.last_pulled_at.map(|c| c.timestamp()),
            schema_version: self.schema_version,
            migration: self.migration.map(|m| m.to_json()).transpose()?,
        })
    }
}

/// Query-string form of a [`PullRequest`].
///
/// Absent values are omitted from the query string entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullQuery {
    /// Cursor timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_pulled_at: Option<i64>,
    /// Local schema version.
    pub schema_version: SchemaVersion,
    /// JSON-encoded migration descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration: Option<String>,
}

impl TryFrom<PullQuery> for PullRequest {
    type Error = ProtocolError;

    fn try_from(query: PullQuery) -> ProtocolResult<Self> {
        let migration = query
            .migration
            .as_deref()
            .map(MigrationDescriptor::from_json)
            .transpose()?;
        Ok(Self {
            last_pulled_at: query.last_pulled_at.map(Cursor::new),
            schema_version: query.schema_version,
            migration,
        })
    }
}

/// Pull response from server.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PullResponse {
    /// Changes since the requested cursor.
    #[serde(default)]
    pub changes: Changeset,
    /// Server time at which the response was generated; the next cursor.
    pub timestamp: i64,
    /// Schema version the server expects clients to be at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<SchemaVersion>,
    /// Migration steps for the requested range.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub migrations: Vec<MigrationStep>,
}

impl PullResponse {
    /// Creates a response with changes and a new cursor.
    pub fn new(changes: Changeset, timestamp: i64) -> Self {
        Self {
            changes,
            timestamp,
            schema_version: None,
            migrations: Vec::new(),
        }
    }

    /// Sets the schema version the server expects.
    pub fn with_schema_version(mut self, version: SchemaVersion) -> Self {
        self.schema_version = Some(version);
        self
    }

    /// Sets the migration steps.
    pub fn with_migrations(mut self, migrations: Vec<MigrationStep>) -> Self {
        self.migrations = migrations;
        self
    }

    /// Returns the new cursor.
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.timestamp)
    }
}

/// Push request from client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Local changes.
    pub changes: Changeset,
    /// Cursor obtained by the pull that immediately preceded this push.
    #[serde(rename = "lastPulledAt")]
    pub last_pulled_at: Cursor,
}

impl PushRequest {
    /// Creates a new push request.
    pub fn new(changes: Changeset, last_pulled_at: Cursor) -> Self {
        Self {
            changes,
            last_pulled_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use serde_json::json;

    #[test]
    fn pull_query_omits_absent_fields() {
        let query = PullRequest::new(None, 3).to_query().unwrap();
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({"schema_version": 3})
        );
    }

    #[test]
    fn pull_query_carries_migration_json() {
        let request = PullRequest::new(Some(Cursor::new(1000)), 1)
            .with_migration(MigrationDescriptor::between(1, 2));
        let query = request.to_query().unwrap();
        assert_eq!(query.last_pulled_at, Some(1000));
        assert_eq!(query.migration.as_deref(), Some(r#"{"from":1,"to":2}"#));

        let back = PullRequest::try_from(query).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn pull_query_rejects_bad_migration() {
        let query = PullQuery {
            last_pulled_at: None,
            schema_version: 1,
            migration: Some("{".into()),
        };
        assert!(PullRequest::try_from(query).is_err());
    }

    #[test]
    fn pull_response_minimal_body() {
        let response: PullResponse =
            serde_json::from_value(json!({"changes": {}, "timestamp": 42})).unwrap();
        assert!(response.changes.is_empty());
        assert_eq!(response.cursor(), Cursor::new(42));
        assert_eq!(response.schema_version, None);
        assert!(response.migrations.is_empty());
    }

    #[test]
    fn push_request_wire_shape() {
        let mut changes = Changeset::new();
        changes
            .table_mut("notes")
            .updated
            .push(Record::new("a").with("body", "x"));
        let request = PushRequest::new(changes, Cursor::new(7));
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "changes": {"notes": {"created": [], "updated": [{"id": "a", "body": "x"}], "deleted": []}},
                "lastPulledAt": 7
            })
        );
    }
}
