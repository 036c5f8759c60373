//! In-memory reference implementation of [`LocalStore`].
//!
//! Records live in per-table maps next to a change log keyed by
//! `(table, id)`. Every local mutation stamps its log entry with a fresh
//! sequence number, so a commit can clear exactly the entries that were
//! pushed while keeping anything edited afterwards.
//!
//! ## Remote apply rules
//!
//! - Created or updated remotely, untouched locally: take the remote record
//! - Created or updated remotely, modified locally: ask the [`MergePolicy`]
//! - Updated remotely, deleted locally: keep the local delete
//! - Deleted remotely: remove the record and any pending change
//!
//! A pull and its migration steps are applied to one copy of the state,
//! which is swapped in only when both succeed.

use crate::error::{SyncError, SyncResult};
use crate::store::{AppliedPull, FieldLevelMerge, LocalChanges, LocalStore, MergePolicy, SyncCommit};
use notebook_sync_protocol::{
    Changeset, Cursor, MigrationOperation, MigrationStep, ProtocolError, Record, SchemaVersion,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Table definitions at a given schema version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Schema version.
    pub version: SchemaVersion,
    /// Table name to column names.
    pub tables: BTreeMap<String, BTreeSet<String>>,
}

impl Schema {
    /// Creates an empty schema at `version`.
    pub fn new(version: SchemaVersion) -> Self {
        Self {
            version,
            tables: BTreeMap::new(),
        }
    }

    /// Adds a table, builder style.
    pub fn table(mut self, name: &str, columns: &[&str]) -> Self {
        self.tables.insert(
            name.to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    /// Returns true if the table exists.
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    fn apply(&mut self, step: &MigrationStep) -> SyncResult<()> {
        if step.version != self.version + 1 {
            return Err(SyncError::ApplyFailed(format!(
                "migration to {} cannot follow schema {}",
                step.version, self.version
            )));
        }
        for operation in &step.operations {
            match operation {
                MigrationOperation::CreateTable { table, columns } => {
                    if self.has_table(table) {
                        return Err(SyncError::ApplyFailed(format!(
                            "table {table} already exists"
                        )));
                    }
                    self.tables
                        .insert(table.clone(), columns.iter().cloned().collect());
                }
                MigrationOperation::AddColumns { table, columns } => {
                    let existing = self.tables.get_mut(table).ok_or_else(|| {
                        SyncError::ApplyFailed(format!("cannot add columns to unknown table {table}"))
                    })?;
                    existing.extend(columns.iter().cloned());
                }
            }
        }
        self.version = step.version;
        Ok(())
    }
}

/// Kind of a pending local change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Created locally, never acknowledged.
    Created,
    /// Updated locally.
    Updated,
    /// Deleted locally.
    Deleted,
}

/// A change-log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PendingChange {
    kind: ChangeKind,
    changed_fields: BTreeSet<String>,
    seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreState {
    schema: Schema,
    server_schema_version: Option<SchemaVersion>,
    last_pulled_at: Option<Cursor>,
    records: BTreeMap<String, BTreeMap<String, Record>>,
    changes: BTreeMap<String, BTreeMap<String, PendingChange>>,
    next_seq: u64,
}

impl StoreState {
    fn new(schema: Schema) -> Self {
        Self {
            schema,
            server_schema_version: None,
            last_pulled_at: None,
            records: BTreeMap::new(),
            changes: BTreeMap::new(),
            next_seq: 1,
        }
    }

    fn check_table(&self, table: &str) -> SyncResult<()> {
        if self.schema.has_table(table) {
            Ok(())
        } else {
            Err(SyncError::Storage(format!("unknown table {table}")))
        }
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn pending(&self, table: &str, id: &str) -> Option<&PendingChange> {
        self.changes.get(table).and_then(|t| t.get(id))
    }

    fn set_pending(&mut self, table: &str, id: &str, change: PendingChange) {
        self.changes
            .entry(table.to_string())
            .or_default()
            .insert(id.to_string(), change);
    }

    fn clear_pending(&mut self, table: &str, id: &str) {
        if let Some(entries) = self.changes.get_mut(table) {
            entries.remove(id);
            if entries.is_empty() {
                self.changes.remove(table);
            }
        }
    }

    fn upsert_remote(
        &mut self,
        table: &str,
        remote: &Record,
        policy: &dyn MergePolicy,
    ) -> SyncResult<()> {
        let id = remote.id().ok_or_else(|| {
            SyncError::ApplyFailed(ProtocolError::MissingId {
                table: table.to_string(),
            }
            .to_string())
        })?;

        let merged = match self.pending(table, id) {
            Some(change) if change.kind == ChangeKind::Deleted => return Ok(()),
            Some(change) => self
                .records
                .get(table)
                .and_then(|t| t.get(id))
                .map(|local| policy.merge(local, &change.changed_fields, remote)),
            None => None,
        };

        let record = match merged {
            Some(merged) if merged != *remote => merged,
            _ => {
                self.clear_pending(table, id);
                remote.clone()
            }
        };

        self.records
            .entry(table.to_string())
            .or_default()
            .insert(id.to_string(), record);
        Ok(())
    }

    fn delete_remote(&mut self, table: &str, id: &str) {
        if let Some(records) = self.records.get_mut(table) {
            records.remove(id);
        }
        self.clear_pending(table, id);
    }

    fn apply_changeset(
        &mut self,
        changes: &Changeset,
        policy: &dyn MergePolicy,
    ) -> SyncResult<usize> {
        let mut applied = 0;
        for (table, table_changes) in changes.tables() {
            if !self.schema.has_table(table) {
                return Err(SyncError::ApplyFailed(format!("unknown table {table}")));
            }
            for record in table_changes.created.iter().chain(&table_changes.updated) {
                self.upsert_remote(table, record, policy)?;
                applied += 1;
            }
            for id in &table_changes.deleted {
                self.delete_remote(table, id);
                applied += 1;
            }
        }
        Ok(applied)
    }

    fn migrate(&mut self, steps: &[MigrationStep]) -> SyncResult<SchemaVersion> {
        for step in steps {
            self.schema.apply(step)?;
        }
        Ok(self.schema.version)
    }
}

/// In-memory [`LocalStore`] with a live change log.
pub struct MemoryStore {
    state: RwLock<StoreState>,
    policy: Box<dyn MergePolicy>,
}

impl MemoryStore {
    /// Creates an empty store with the given schema and field-level merge.
    pub fn new(schema: Schema) -> Self {
        Self {
            state: RwLock::new(StoreState::new(schema)),
            policy: Box::new(FieldLevelMerge),
        }
    }

    /// Replaces the merge policy.
    pub fn with_merge_policy(mut self, policy: impl MergePolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Loads a snapshot written by [`MemoryStore::save`].
    pub fn load(path: &Path) -> SyncResult<Self> {
        let json = fs::read_to_string(path).map_err(|e| SyncError::Storage(e.to_string()))?;
        let state: StoreState =
            serde_json::from_str(&json).map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(Self {
            state: RwLock::new(state),
            policy: Box::new(FieldLevelMerge),
        })
    }

    /// Writes a JSON snapshot of the whole store.
    pub fn save(&self, path: &Path) -> SyncResult<()> {
        let json = serde_json::to_string_pretty(&*self.state.read())
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        fs::write(path, json).map_err(|e| SyncError::Storage(e.to_string()))
    }

    /// Returns the current schema.
    pub fn schema(&self) -> Schema {
        self.state.read().schema.clone()
    }

    /// Creates a record locally.
    pub fn create(&self, table: &str, record: Record) -> SyncResult<()> {
        let mut state = self.state.write();
        state.check_table(table)?;
        let id = record
            .id()
            .ok_or_else(|| SyncError::Storage(format!("record without id in {table}")))?
            .to_string();

        if state.records.get(table).is_some_and(|t| t.contains_key(&id)) {
            return Err(SyncError::Storage(format!("{table}/{id} already exists")));
        }

        // Recreating a deleted-but-unpushed id turns into an update.
        let kind = match state.pending(table, &id) {
            Some(change) if change.kind == ChangeKind::Deleted => ChangeKind::Updated,
            _ => ChangeKind::Created,
        };
        let changed_fields = record.fields().keys().filter(|k| *k != "id").cloned().collect();
        let seq = state.bump_seq();
        state.set_pending(
            table,
            &id,
            PendingChange {
                kind,
                changed_fields,
                seq,
            },
        );
        state
            .records
            .entry(table.to_string())
            .or_default()
            .insert(id, record);
        Ok(())
    }

    /// Updates fields of an existing record locally.
    pub fn update(&self, table: &str, id: &str, fields: Map<String, Value>) -> SyncResult<()> {
        let mut state = self.state.write();
        state.check_table(table)?;

        let record = state
            .records
            .get_mut(table)
            .and_then(|t| t.get_mut(id))
            .ok_or_else(|| SyncError::Storage(format!("{table}/{id} not found")))?;

        let mut touched = BTreeSet::new();
        for (field, value) in fields {
            if field == "id" {
                continue;
            }
            record.set(field.clone(), value);
            touched.insert(field);
        }

        let seq = state.bump_seq();
        let change = match state.pending(table, id) {
            Some(existing) => {
                let mut change = existing.clone();
                change.changed_fields.extend(touched);
                change.seq = seq;
                change
            }
            None => PendingChange {
                kind: ChangeKind::Updated,
                changed_fields: touched,
                seq,
            },
        };
        state.set_pending(table, id, change);
        Ok(())
    }

    /// Deletes a record locally.
    pub fn delete(&self, table: &str, id: &str) -> SyncResult<()> {
        let mut state = self.state.write();
        state.check_table(table)?;

        let removed = state.records.get_mut(table).and_then(|t| t.remove(id));
        if removed.is_none() {
            return Err(SyncError::Storage(format!("{table}/{id} not found")));
        }

        match state.pending(table, id).map(|c| c.kind) {
            // Never reached the server: forget it entirely.
            Some(ChangeKind::Created) => state.clear_pending(table, id),
            _ => {
                let seq = state.bump_seq();
                state.set_pending(
                    table,
                    id,
                    PendingChange {
                        kind: ChangeKind::Deleted,
                        changed_fields: BTreeSet::new(),
                        seq,
                    },
                );
            }
        }
        Ok(())
    }

    /// Returns a record.
    pub fn get(&self, table: &str, id: &str) -> Option<Record> {
        self.state
            .read()
            .records
            .get(table)
            .and_then(|t| t.get(id))
            .cloned()
    }

    /// Returns the number of records in a table.
    pub fn count(&self, table: &str) -> usize {
        self.state.read().records.get(table).map_or(0, BTreeMap::len)
    }

    /// Returns the number of pending local changes.
    pub fn pending_count(&self) -> usize {
        self.state.read().changes.values().map(BTreeMap::len).sum()
    }

    /// Returns the pending change kind of a record, if any.
    pub fn pending_kind(&self, table: &str, id: &str) -> Option<ChangeKind> {
        self.state.read().pending(table, id).map(|c| c.kind)
    }
}

impl LocalStore for MemoryStore {
    fn last_pulled_at(&self) -> SyncResult<Option<Cursor>> {
        Ok(self.state.read().last_pulled_at)
    }

    fn schema_version(&self) -> SyncResult<SchemaVersion> {
        Ok(self.state.read().schema.version)
    }

    fn known_server_schema_version(&self) -> SyncResult<Option<SchemaVersion>> {
        Ok(self.state.read().server_schema_version)
    }

    fn local_changes(&self) -> SyncResult<LocalChanges> {
        let state = self.state.read();
        let mut changeset = Changeset::new();
        let mut watermark = 0;

        for (table, entries) in &state.changes {
            for (id, change) in entries {
                watermark = watermark.max(change.seq);
                let current = state.records.get(table).and_then(|t| t.get(id));
                let target = changeset.table_mut(table);
                match (change.kind, current) {
                    (ChangeKind::Deleted, _) => target.deleted.push(id.clone()),
                    (ChangeKind::Created, Some(record)) => target.created.push(record.clone()),
                    (ChangeKind::Updated, Some(record)) => target.updated.push(record.clone()),
                    (_, None) => {
                        return Err(SyncError::Internal(format!(
                            "change log references missing record {table}/{id}"
                        )))
                    }
                }
            }
        }

        Ok(LocalChanges {
            changeset,
            watermark,
        })
    }

    fn apply_pull(&self, changes: &Changeset, steps: &[MigrationStep]) -> SyncResult<AppliedPull> {
        let mut state = self.state.write();
        let mut next = state.clone();
        let records = next.apply_changeset(changes, self.policy.as_ref())?;
        let schema_version = next.migrate(steps)?;

        *state = next;
        debug!(records, schema_version, "applied pull");
        Ok(AppliedPull {
            records,
            schema_version,
        })
    }

    fn commit(&self, commit: SyncCommit) -> SyncResult<()> {
        let mut state = self.state.write();

        if let Some(current) = state.last_pulled_at {
            if commit.cursor < current {
                return Err(ProtocolError::CursorRegression {
                    requested: current.timestamp(),
                    returned: commit.cursor.timestamp(),
                }
                .into());
            }
        }

        state.last_pulled_at = Some(commit.cursor);
        if commit.server_schema_version.is_some() {
            state.server_schema_version = commit.server_schema_version;
        }
        for entries in state.changes.values_mut() {
            entries.retain(|_, change| change.seq > commit.watermark);
        }
        state.changes.retain(|_, entries| !entries.is_empty());
        Ok(())
    }
}
