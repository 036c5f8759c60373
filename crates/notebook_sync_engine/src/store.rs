//! Local store boundary.
//!
//! The embedded record store owns the cursor, the schema version, and the
//! change log. The sync core only reads the change log, hands pulled
//! changes to the store, and tells it when a cycle has been acknowledged.

use crate::error::SyncResult;
use notebook_sync_protocol::{Changeset, Cursor, MigrationStep, Record, SchemaVersion};
use std::collections::BTreeSet;

/// Local changes collected for one push.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocalChanges {
    /// Everything mutated locally and not yet acknowledged.
    pub changeset: Changeset,
    /// Highest change-log sequence included in `changeset`.
    ///
    /// Committing with this watermark clears exactly these entries; edits
    /// made afterwards stay pending.
    pub watermark: u64,
}

/// What gets durably recorded once a cycle has fully succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncCommit {
    /// New cursor, as returned by the cycle's pull.
    pub cursor: Cursor,
    /// Change-log watermark of the pushed changes.
    pub watermark: u64,
    /// Schema version the server announced, if any.
    pub server_schema_version: Option<SchemaVersion>,
}

/// Result of folding one pull into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedPull {
    /// Number of records created, updated, or deleted.
    pub records: usize,
    /// Schema version after the migration steps.
    pub schema_version: SchemaVersion,
}

/// The sync API of the embedded local store.
pub trait LocalStore: Send + Sync {
    /// Returns the committed cursor, `None` before the first sync.
    fn last_pulled_at(&self) -> SyncResult<Option<Cursor>>;

    /// Returns the local schema version.
    fn schema_version(&self) -> SyncResult<SchemaVersion>;

    /// Returns the schema version the server last announced.
    fn known_server_schema_version(&self) -> SyncResult<Option<SchemaVersion>>;

    /// Returns the live change log as a changeset.
    fn local_changes(&self) -> SyncResult<LocalChanges>;

    /// Folds a pulled changeset into the store, then applies the pulled
    /// migration steps in order.
    ///
    /// Both halves succeed together or leave the store untouched.
    fn apply_pull(&self, changes: &Changeset, steps: &[MigrationStep]) -> SyncResult<AppliedPull>;

    /// Durably advances the cursor and clears acknowledged changes.
    ///
    /// Must refuse to move the cursor backwards.
    fn commit(&self, commit: SyncCommit) -> SyncResult<()>;
}

/// Strategy for records changed both locally and remotely.
pub trait MergePolicy: Send + Sync {
    /// Merges a pulled `remote` record into a locally modified `local` one.
    ///
    /// `changed_fields` lists the fields edited locally since the last
    /// acknowledged sync. If the result equals `remote`, the local change
    /// is considered absorbed and leaves the change log.
    fn merge(&self, local: &Record, changed_fields: &BTreeSet<String>, remote: &Record) -> Record;
}

/// Takes the server's fields, except those edited locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldLevelMerge;

impl MergePolicy for FieldLevelMerge {
    fn merge(&self, local: &Record, changed_fields: &BTreeSet<String>, remote: &Record) -> Record {
        let mut merged = remote.clone();
        for field in changed_fields {
            if let Some(value) = local.get(field) {
                merged.set(field.clone(), value.clone());
            }
        }
        merged
    }
}

/// Takes the server's record wholesale.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerWins;

impl MergePolicy for ServerWins {
    fn merge(
        &self,
        _local: &Record,
        _changed_fields: &BTreeSet<String>,
        remote: &Record,
    ) -> Record {
        remote.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn field_level_keeps_local_edits() {
        let local = Record::new("a").with("title", "mine").with("body", "old");
        let remote = Record::new("a").with("title", "theirs").with("body", "new");

        let merged = FieldLevelMerge.merge(&local, &fields(&["title"]), &remote);
        assert_eq!(merged.get("title"), Some(&json!("mine")));
        assert_eq!(merged.get("body"), Some(&json!("new")));
    }

    #[test]
    fn field_level_without_edits_is_remote() {
        let local = Record::new("a").with("title", "mine");
        let remote = Record::new("a").with("title", "theirs");
        assert_eq!(FieldLevelMerge.merge(&local, &fields(&[]), &remote), remote);
    }

    #[test]
    fn server_wins_ignores_local() {
        let local = Record::new("a").with("title", "mine");
        let remote = Record::new("a").with("title", "theirs");
        assert_eq!(ServerWins.merge(&local, &fields(&["title"]), &remote), remote);
    }
}
