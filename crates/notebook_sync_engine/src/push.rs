//! Push client.

use crate::credential::AuthHeader;
use crate::error::SyncResult;
use crate::transport::SyncTransport;
use notebook_sync_protocol::{Changeset, Cursor, PushRequest};
use std::sync::Arc;
use tracing::debug;

/// Submits local changes to the server.
///
/// With `send_created_as_updated` on, locally created records travel as
/// updates: the server upserts them, so a resent payload cannot
/// double-insert.
pub struct PushClient<T: SyncTransport> {
    transport: Arc<T>,
    send_created_as_updated: bool,
}

impl<T: SyncTransport> PushClient<T> {
    /// Creates a push client.
    pub fn new(transport: Arc<T>, send_created_as_updated: bool) -> Self {
        Self {
            transport,
            send_created_as_updated,
        }
    }

    /// Builds the request that [`push`](Self::push) would send.
    pub fn prepare(&self, changeset: Changeset, cursor_at_pull_time: Cursor) -> PushRequest {
        let changes = if self.send_created_as_updated {
            changeset.created_as_updated()
        } else {
            changeset
        };
        PushRequest::new(changes, cursor_at_pull_time)
    }

    /// Pushes `changeset`, tagged with the cursor of the preceding pull.
    ///
    /// An empty changeset makes no network call.
    pub async fn push(
        &self,
        changeset: Changeset,
        cursor_at_pull_time: Cursor,
        auth: &AuthHeader,
    ) -> SyncResult<usize> {
        if changeset.is_empty() {
            debug!("nothing to push");
            return Ok(0);
        }

        let request = self.prepare(changeset, cursor_at_pull_time);
        let count = request.changes.record_count();
        self.transport.push(&request, auth).await?;

        debug!(records = count, cursor = %cursor_at_pull_time, "push acknowledged");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::transport::MockTransport;
    use notebook_sync_protocol::Record;

    fn local_changes() -> Changeset {
        let mut changes = Changeset::new();
        changes.table_mut("notes").created.push(Record::new("new"));
        changes.table_mut("notes").updated.push(Record::new("old"));
        changes.table_mut("notes").deleted.push("gone".into());
        changes
    }

    #[tokio::test]
    async fn sends_created_as_updated() {
        let transport = Arc::new(MockTransport::new());
        let client = PushClient::new(Arc::clone(&transport), true);

        let pushed = client
            .push(local_changes(), Cursor::new(7), &AuthHeader::new("s=1"))
            .await
            .unwrap();
        assert_eq!(pushed, 3);

        let sent = &transport.pushes()[0];
        assert_eq!(sent.last_pulled_at, Cursor::new(7));
        let notes = sent.changes.table("notes").unwrap();
        assert!(notes.created.is_empty());
        assert_eq!(notes.updated.len(), 2);
        assert_eq!(notes.deleted, vec!["gone"]);
    }

    #[tokio::test]
    async fn keeps_created_when_disabled() {
        let transport = Arc::new(MockTransport::new());
        let client = PushClient::new(Arc::clone(&transport), false);
        let request = client.prepare(local_changes(), Cursor::new(1));
        assert_eq!(request.changes.table("notes").unwrap().created.len(), 1);
    }

    #[tokio::test]
    async fn empty_changeset_skips_network() {
        let transport = Arc::new(MockTransport::new());
        let client = PushClient::new(Arc::clone(&transport), true);

        let pushed = client
            .push(Changeset::new(), Cursor::new(1), &AuthHeader::new("s=1"))
            .await
            .unwrap();
        assert_eq!(pushed, 0);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn resend_carries_identical_payload() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_next_push(SyncError::push_status(500, "oops"));
        let client = PushClient::new(Arc::clone(&transport), true);
        let auth = AuthHeader::new("s=1");

        assert!(client
            .push(local_changes(), Cursor::new(3), &auth)
            .await
            .is_err());
        client
            .push(local_changes(), Cursor::new(3), &auth)
            .await
            .unwrap();

        let pushes = transport.pushes();
        assert_eq!(pushes[0], pushes[1]);
    }
}
