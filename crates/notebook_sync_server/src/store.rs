//! In-memory server record store.
//!
//! Every write is stamped with the server clock, which never repeats and
//! never goes backwards. A pull answers with the current clock value as its
//! cursor and reports everything stamped after the requested cursor. Deleted
//! records leave tombstones so later pulls can report them.

use crate::error::{ServerError, ServerResult};
use chrono::Utc;
use notebook_sync_protocol::{Changeset, Cursor, Record};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

/// Source of wall-clock milliseconds.
pub type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

#[derive(Debug, Clone)]
struct StoredRecord {
    record: Record,
    created_at: i64,
    updated_at: i64,
}

#[derive(Debug, Default)]
struct TableState {
    records: BTreeMap<String, StoredRecord>,
    tombstones: BTreeMap<String, i64>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: BTreeMap<String, TableState>,
    clock: i64,
}

impl Inner {
    /// Returns a fresh write stamp.
    fn tick(&mut self, now: i64) -> i64 {
        self.clock = now.max(self.clock + 1);
        self.clock
    }

    /// Returns the first pushed record the client has not seen yet.
    fn find_conflict(&self, changes: &Changeset, since: i64) -> Option<(String, String)> {
        for (table, table_changes) in changes.tables() {
            let Some(state) = self.tables.get(table) else {
                continue;
            };
            for record in table_changes.created.iter().chain(&table_changes.updated) {
                let Some(id) = record.id() else { continue };
                let stale = match state.records.get(id) {
                    Some(stored) => stored.updated_at > since && stored.record != *record,
                    None => state.tombstones.get(id).is_some_and(|at| *at > since),
                };
                if stale {
                    return Some((table.to_string(), id.to_string()));
                }
            }
            for id in &table_changes.deleted {
                if state
                    .records
                    .get(id)
                    .is_some_and(|stored| stored.updated_at > since)
                {
                    return Some((table.to_string(), id.clone()));
                }
            }
        }
        None
    }
}

/// Counts of what a push changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PushSummary {
    /// Records inserted or changed.
    pub upserted: usize,
    /// Records tombstoned.
    pub deleted: usize,
    /// Records identical to what the server already had.
    pub unchanged: usize,
}

/// Authoritative record store behind the sync endpoints.
pub struct ServerStore {
    inner: RwLock<Inner>,
    now: Clock,
}

impl ServerStore {
    /// Creates an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Box::new(|| Utc::now().timestamp_millis()))
    }

    /// Creates an empty store on a custom clock.
    pub fn with_clock(now: Clock) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            now,
        }
    }

    /// Returns the last issued clock value.
    pub fn clock(&self) -> i64 {
        self.inner.read().clock
    }

    /// Returns a live record.
    pub fn get(&self, table: &str, id: &str) -> Option<Record> {
        self.inner
            .read()
            .tables
            .get(table)
            .and_then(|t| t.records.get(id))
            .map(|stored| stored.record.clone())
    }

    /// Returns the number of live records in a table.
    pub fn count(&self, table: &str) -> usize {
        self.inner
            .read()
            .tables
            .get(table)
            .map_or(0, |t| t.records.len())
    }

    /// Returns changes stamped after `since` and the cursor covering them.
    ///
    /// Without a cursor every live record is reported as created and no
    /// tombstones are sent. The returned cursor is never below `since`.
    pub fn pull(&self, since: Option<Cursor>) -> (Changeset, Cursor) {
        let now = (self.now)();
        let mut inner = self.inner.write();
        let requested = since.map_or(i64::MIN, |c| c.timestamp());
        inner.clock = inner.clock.max(now).max(requested);
        let cursor = Cursor::new(inner.clock);

        let mut changes = Changeset::new();
        for (name, table) in &inner.tables {
            for stored in table.records.values() {
                if stored.updated_at <= requested {
                    continue;
                }
                let target = changes.table_mut(name);
                if stored.created_at > requested {
                    target.created.push(stored.record.clone());
                } else {
                    target.updated.push(stored.record.clone());
                }
            }
            if since.is_some() {
                for (id, deleted_at) in &table.tombstones {
                    if *deleted_at > requested {
                        changes.table_mut(name).deleted.push(id.clone());
                    }
                }
            }
        }

        debug!(records = changes.record_count(), %cursor, "served pull");
        (changes, cursor)
    }

    /// Applies a push made after pulling up to `last_pulled_at`.
    ///
    /// Created and updated records are upserted. Resending a record the
    /// server already holds unchanged is a no-op, so a retried push is
    /// accepted. A push touching a record changed on the server since
    /// `last_pulled_at` is rejected whole.
    pub fn push(&self, changes: &Changeset, last_pulled_at: Cursor) -> ServerResult<PushSummary> {
        changes.validate()?;

        let now = (self.now)();
        let mut inner = self.inner.write();
        let since = last_pulled_at.timestamp();

        if let Some((table, id)) = inner.find_conflict(changes, since) {
            return Err(ServerError::Conflict {
                table,
                id,
                last_pulled_at: since,
            });
        }

        let mut summary = PushSummary::default();
        for (name, table_changes) in changes.tables() {
            for record in table_changes.created.iter().chain(&table_changes.updated) {
                let Some(id) = record.id() else { continue };
                let existing = inner
                    .tables
                    .get(name)
                    .and_then(|t| t.records.get(id))
                    .cloned();
                if existing.as_ref().is_some_and(|s| s.record == *record) {
                    summary.unchanged += 1;
                    continue;
                }

                let stamp = inner.tick(now);
                let table = inner.tables.entry(name.to_string()).or_default();
                table.tombstones.remove(id);
                table.records.insert(
                    id.to_string(),
                    StoredRecord {
                        record: record.clone(),
                        created_at: existing.map_or(stamp, |s| s.created_at),
                        updated_at: stamp,
                    },
                );
                summary.upserted += 1;
            }

            for id in &table_changes.deleted {
                let live = inner
                    .tables
                    .get(name)
                    .is_some_and(|t| t.records.contains_key(id));
                if !live {
                    summary.unchanged += 1;
                    continue;
                }
                let stamp = inner.tick(now);
                let table = inner.tables.entry(name.to_string()).or_default();
                table.records.remove(id);
                table.tombstones.insert(id.clone(), stamp);
                summary.deleted += 1;
            }
        }

        debug!(
            upserted = summary.upserted,
            deleted = summary.deleted,
            unchanged = summary.unchanged,
            clock = inner.clock,
            "applied push"
        );
        Ok(summary)
    }
}

impl Default for ServerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    /// Store whose clock is frozen unless advanced by hand.
    fn store_at(time: &Arc<AtomicI64>) -> ServerStore {
        let time = Arc::clone(time);
        ServerStore::with_clock(Box::new(move || time.load(Ordering::SeqCst)))
    }

    fn note(id: &str, title: &str) -> Record {
        Record::new(id).with("title", title)
    }

    fn upsert(records: &[Record]) -> Changeset {
        let mut changes = Changeset::new();
        changes.table_mut("notes").updated.extend(records.iter().cloned());
        changes
    }

    fn delete(ids: &[&str]) -> Changeset {
        let mut changes = Changeset::new();
        changes
            .table_mut("notes")
            .deleted
            .extend(ids.iter().map(|id| id.to_string()));
        changes
    }

    #[test]
    fn clock_is_monotonic_within_one_millisecond() {
        let time = Arc::new(AtomicI64::new(100));
        let store = store_at(&time);

        let (_, cursor) = store.pull(None);
        assert_eq!(cursor, Cursor::new(100));

        store.push(&upsert(&[note("a", "x")]), cursor).unwrap();
        assert_eq!(store.clock(), 101);

        let (changes, next) = store.pull(Some(cursor));
        assert_eq!(next, Cursor::new(101));
        assert_eq!(changes.table("notes").unwrap().created.len(), 1);
    }

    #[test]
    fn pull_never_returns_cursor_below_request() {
        let time = Arc::new(AtomicI64::new(5));
        let store = store_at(&time);
        let (_, cursor) = store.pull(Some(Cursor::new(1_000)));
        assert_eq!(cursor, Cursor::new(1_000));
    }

    #[test]
    fn full_pull_reports_live_records_as_created() {
        let time = Arc::new(AtomicI64::new(10));
        let store = store_at(&time);
        store
            .push(&upsert(&[note("a", "x"), note("b", "y")]), Cursor::new(0))
            .unwrap();
        store.push(&delete(&["b"]), Cursor::new(20)).unwrap();

        let (changes, _) = store.pull(None);
        let notes = changes.table("notes").unwrap();
        assert_eq!(notes.created.len(), 1);
        assert!(notes.deleted.is_empty());
    }

    #[test]
    fn incremental_pull_splits_created_updated_deleted() {
        let time = Arc::new(AtomicI64::new(10));
        let store = store_at(&time);
        store
            .push(&upsert(&[note("a", "x"), note("b", "y")]), Cursor::new(0))
            .unwrap();
        let (_, cursor) = store.pull(None);

        time.store(50, Ordering::SeqCst);
        store
            .push(&upsert(&[note("a", "x2"), note("c", "z")]), cursor)
            .unwrap();
        store.push(&delete(&["b"]), cursor).unwrap();

        let (changes, next) = store.pull(Some(cursor));
        let notes = changes.table("notes").unwrap();
        assert_eq!(notes.created[0].id(), Some("c"));
        assert_eq!(notes.updated[0].id(), Some("a"));
        assert_eq!(notes.deleted, vec!["b"]);
        assert!(next > cursor);
    }

    #[test]
    fn identical_resend_is_a_noop() {
        let time = Arc::new(AtomicI64::new(10));
        let store = store_at(&time);
        let changes = upsert(&[note("a", "x")]);

        let first = store.push(&changes, Cursor::new(0)).unwrap();
        let clock = store.clock();
        let second = store.push(&changes, Cursor::new(0)).unwrap();

        assert_eq!(first.upserted, 1);
        assert_eq!(second.unchanged, 1);
        assert_eq!(store.clock(), clock);
        assert_eq!(store.count("notes"), 1);
    }

    #[test]
    fn stale_push_conflicts() {
        let time = Arc::new(AtomicI64::new(10));
        let store = store_at(&time);
        store.push(&upsert(&[note("a", "server")]), Cursor::new(0)).unwrap();

        let result = store.push(&upsert(&[note("a", "client")]), Cursor::new(5));
        assert!(matches!(result, Err(ServerError::Conflict { .. })));
        assert_eq!(
            store.get("notes", "a").unwrap().get("title").and_then(|v| v.as_str()),
            Some("server")
        );
    }

    #[test]
    fn conflict_rejects_whole_push() {
        let time = Arc::new(AtomicI64::new(10));
        let store = store_at(&time);
        store.push(&upsert(&[note("a", "server")]), Cursor::new(0)).unwrap();

        let result = store.push(
            &upsert(&[note("b", "new"), note("a", "client")]),
            Cursor::new(5),
        );
        assert!(result.is_err());
        assert!(store.get("notes", "b").is_none());
    }

    #[test]
    fn deleting_a_record_changed_since_pull_conflicts() {
        let time = Arc::new(AtomicI64::new(10));
        let store = store_at(&time);
        store.push(&upsert(&[note("a", "server")]), Cursor::new(0)).unwrap();

        assert!(store.push(&delete(&["a"]), Cursor::new(5)).is_err());
        assert!(store.push(&delete(&["a"]), Cursor::new(10)).is_ok());
        assert!(store.get("notes", "a").is_none());
    }

    #[test]
    fn overlapping_push_is_invalid() {
        let store = ServerStore::new();
        let mut changes = upsert(&[note("a", "x")]);
        changes.table_mut("notes").deleted.push("a".into());

        assert!(matches!(
            store.push(&changes, Cursor::new(0)),
            Err(ServerError::InvalidRequest(_))
        ));
    }

    #[test]
    fn recreate_after_delete_clears_tombstone() {
        let time = Arc::new(AtomicI64::new(10));
        let store = store_at(&time);
        store.push(&upsert(&[note("a", "x")]), Cursor::new(0)).unwrap();
        store.push(&delete(&["a"]), Cursor::new(10)).unwrap();
        let (_, cursor) = store.pull(None);

        store.push(&upsert(&[note("a", "again")]), cursor).unwrap();
        let (changes, _) = store.pull(Some(cursor));
        let notes = changes.table("notes").unwrap();
        assert_eq!(notes.created.len(), 1);
        assert!(notes.deleted.is_empty());
    }
}
