//! Pull client.

use crate::credential::AuthHeader;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use notebook_sync_protocol::{
    Changeset, Cursor, MigrationDescriptor, MigrationStep, ProtocolError, PullRequest,
    SchemaVersion,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Server changes ready to be applied locally.
#[derive(Debug, Clone, PartialEq)]
pub struct PulledChanges {
    /// Normalized changeset, shaped for the requested schema version.
    pub changeset: Changeset,
    /// Cursor to commit once the whole cycle succeeds.
    pub new_cursor: Cursor,
    /// Migration steps to apply after the changeset, in order.
    pub migrations: Vec<MigrationStep>,
    /// Schema version the server expects.
    pub server_schema_version: Option<SchemaVersion>,
}

/// Requests and validates server changes. Never touches the local store.
pub struct PullClient<T: SyncTransport> {
    transport: Arc<T>,
}

impl<T: SyncTransport> PullClient<T> {
    /// Creates a pull client.
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Pulls changes newer than `cursor` (everything if `None`).
    pub async fn pull(
        &self,
        cursor: Option<Cursor>,
        schema_version: SchemaVersion,
        migration: Option<MigrationDescriptor>,
        auth: &AuthHeader,
    ) -> SyncResult<PulledChanges> {
        let request = PullRequest::new(cursor, schema_version).with_migration(migration);
        let response = self.transport.pull(&request, auth).await?;

        let new_cursor = response.cursor();
        if !Cursor::can_advance(cursor, new_cursor) {
            return Err(invalid_response(ProtocolError::CursorRegression {
                requested: cursor.map_or(0, |c| c.timestamp()),
                returned: new_cursor.timestamp(),
            }));
        }

        let changeset = response.changes.normalize().map_err(invalid_response)?;

        let migrations = match migration {
            Some(descriptor) => {
                descriptor
                    .validate_chain(&response.migrations)
                    .map_err(invalid_response)?;
                response.migrations
            }
            None => {
                if !response.migrations.is_empty() {
                    warn!(
                        steps = response.migrations.len(),
                        "ignoring unrequested migration steps"
                    );
                }
                Vec::new()
            }
        };

        debug!(
            records = changeset.record_count(),
            cursor = %new_cursor,
            migrations = migrations.len(),
            "pull complete"
        );

        Ok(PulledChanges {
            changeset,
            new_cursor,
            migrations,
            server_schema_version: response.schema_version,
        })
    }
}

fn invalid_response(error: ProtocolError) -> SyncError {
    SyncError::pull_transport(format!("invalid response: {error}"))
}
