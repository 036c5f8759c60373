//! Per-table change batches.
//!
//! A [`Changeset`] maps a table name to three lists: records created,
//! records updated, and ids of records deleted since some cursor.
//!
//! ## Invariants
//!
//! - A record id appears in at most one of the three lists of a table
//! - Every created/updated record carries a string `id`
//!
//! [`Changeset::normalize`] enforces the first invariant on untrusted input,
//! [`Changeset::validate`] reports violations without repairing them.

use crate::error::{ProtocolError, ProtocolResult};
use crate::record::Record;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Changes for a single table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableChanges {
    /// Records created since the cursor.
    #[serde(default)]
    pub created: Vec<Record>,
    /// Records updated since the cursor.
    #[serde(default)]
    pub updated: Vec<Record>,
    /// Ids of records deleted since the cursor.
    #[serde(default, deserialize_with = "deserialize_deleted")]
    pub deleted: Vec<String>,
}

impl TableChanges {
    /// Returns true if the table has no changes.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Returns the total number of entries across the three lists.
    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    /// Moves every created record into the updated list.
    ///
    /// Created records are appended after the existing updates.
    pub fn created_as_updated(mut self) -> Self {
        self.updated.append(&mut self.created);
        self
    }

    fn normalize(self, table: &str) -> ProtocolResult<Self> {
        let deleted: Vec<String> = dedup_last(self.deleted, |id| Some(id.clone()))
            .map_err(|()| missing_id(table))?;
        let deleted_ids: HashSet<&str> = deleted.iter().map(String::as_str).collect();

        let updated = dedup_last(self.updated, |r| r.id().map(str::to_owned))
            .map_err(|()| missing_id(table))?
            .into_iter()
            .filter(|r| r.id().is_some_and(|id| !deleted_ids.contains(id)))
            .collect::<Vec<_>>();
        let updated_ids: HashSet<&str> = updated.iter().filter_map(Record::id).collect();

        let created = dedup_last(self.created, |r| r.id().map(str::to_owned))
            .map_err(|()| missing_id(table))?
            .into_iter()
            .filter(|r| {
                r.id()
                    .is_some_and(|id| !deleted_ids.contains(id) && !updated_ids.contains(id))
            })
            .collect::<Vec<_>>();

        Ok(Self {
            created,
            updated,
            deleted,
        })
    }

    fn validate(&self, table: &str) -> ProtocolResult<()> {
        let mut seen = HashSet::new();
        let ids = self
            .created
            .iter()
            .chain(self.updated.iter())
            .map(|r| r.id().ok_or_else(|| missing_id(table)))
            .chain(self.deleted.iter().map(|id| Ok(id.as_str())));

        for id in ids {
            let id = id?;
            if !seen.insert(id) {
                return Err(ProtocolError::DuplicateRecord {
                    table: table.to_string(),
                    id: id.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A batch of changes keyed by table name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Changeset(BTreeMap<String, TableChanges>);

impl Changeset {
    /// Creates an empty changeset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the changes for a table, if any.
    pub fn table(&self, name: &str) -> Option<&TableChanges> {
        self.0.get(name)
    }

    /// Returns the changes for a table, inserting an empty entry if needed.
    pub fn table_mut(&mut self, name: &str) -> &mut TableChanges {
        self.0.entry(name.to_string()).or_default()
    }

    /// Iterates over `(table, changes)` pairs in table-name order.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &TableChanges)> {
        self.0.iter().map(|(name, changes)| (name.as_str(), changes))
    }

    /// Returns true if no table has any change.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(TableChanges::is_empty)
    }

    /// Returns the number of records across all tables and lists.
    pub fn record_count(&self) -> usize {
        self.0.values().map(TableChanges::len).sum()
    }

    /// Returns a copy where all created records are sent as updates.
    pub fn created_as_updated(self) -> Self {
        Self(
            self.0
                .into_iter()
                .map(|(name, changes)| (name, changes.created_as_updated()))
                .collect(),
        )
    }

    /// Repairs duplicate ids and drops empty tables.
    ///
    /// Within a table, `deleted` beats `updated` beats `created`, and a
    /// duplicate inside one list keeps its last occurrence. Records without
    /// an id are rejected.
    pub fn normalize(self) -> ProtocolResult<Self> {
        let mut tables = BTreeMap::new();
        for (name, changes) in self.0 {
            let changes = changes.normalize(&name)?;
            if !changes.is_empty() {
                tables.insert(name, changes);
            }
        }
        Ok(Self(tables))
    }

    /// Checks the disjointness invariant without modifying the changeset.
    pub fn validate(&self) -> ProtocolResult<()> {
        self.0
            .iter()
            .try_for_each(|(name, changes)| changes.validate(name))
    }
}

impl FromIterator<(String, TableChanges)> for Changeset {
    fn from_iter<I: IntoIterator<Item = (String, TableChanges)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn missing_id(table: &str) -> ProtocolError {
    ProtocolError::MissingId {
        table: table.to_string(),
    }
}

/// Keeps the last occurrence of each key, preserving the order of those
/// last occurrences. Fails if any item has no key.
fn dedup_last<T, F>(items: Vec<T>, key: F) -> Result<Vec<T>, ()>
where
    F: Fn(&T) -> Option<String>,
{
    let keys = items.iter().map(&key).collect::<Option<Vec<_>>>().ok_or(())?;
    let mut seen = HashSet::new();
    let mut kept: Vec<T> = items
        .into_iter()
        .zip(keys)
        .rev()
        .filter_map(|(item, k)| seen.insert(k).then_some(item))
        .collect();
    kept.reverse();
    Ok(kept)
}

/// Accepts deleted entries either as bare ids or as objects with an `id`.
fn deserialize_deleted<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DeletedRef {
        Id(String),
        Record { id: String },
    }

    let refs = Vec::<DeletedRef>::deserialize(deserializer)?;
    refs.into_iter()
        .map(|r| match r {
            DeletedRef::Id(id) | DeletedRef::Record { id } if !id.is_empty() => Ok(id),
            _ => Err(de::Error::custom("deleted entry with empty id")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn note(id: &str, body: &str) -> Record {
        Record::new(id).with("body", body)
    }

    #[test]
    fn wire_shape() {
        let mut changes = Changeset::new();
        changes.table_mut("notes").created.push(note("a", "hi"));
        changes.table_mut("notes").deleted.push("b".into());

        let value = serde_json::to_value(&changes).unwrap();
        assert_eq!(
            value,
            json!({"notes": {
                "created": [{"id": "a", "body": "hi"}],
                "updated": [],
                "deleted": ["b"]
            }})
        );
    }

    #[test]
    fn deleted_accepts_record_objects() {
        let changes: Changeset = serde_json::from_value(json!({
            "notes": {"deleted": [{"id": "b", "body": "gone"}, "c"]}
        }))
        .unwrap();
        assert_eq!(changes.table("notes").unwrap().deleted, vec!["b", "c"]);
    }

    #[test]
    fn normalize_prefers_deleted_then_updated() {
        let mut changes = Changeset::new();
        let notes = changes.table_mut("notes");
        notes.created.push(note("a", "v1"));
        notes.updated.push(note("a", "v2"));
        notes.created.push(note("b", "v1"));
        notes.updated.push(note("c", "v1"));
        notes.updated.push(note("c", "v2"));
        notes.deleted.push("b".into());
        changes.table_mut("empty");

        let normalized = changes.normalize().unwrap();
        normalized.validate().unwrap();

        let notes = normalized.table("notes").unwrap();
        assert!(notes.created.is_empty());
        assert_eq!(notes.updated, vec![note("a", "v2"), note("c", "v2")]);
        assert_eq!(notes.deleted, vec!["b"]);
        assert!(normalized.table("empty").is_none());
    }

    #[test]
    fn normalize_rejects_missing_id() {
        let mut changes = Changeset::new();
        changes
            .table_mut("notes")
            .updated
            .push(Record::from_fields(serde_json::Map::new()));
        assert!(matches!(
            changes.normalize(),
            Err(ProtocolError::MissingId { .. })
        ));
    }

    #[test]
    fn validate_reports_duplicates() {
        let mut changes = Changeset::new();
        changes.table_mut("notes").updated.push(note("a", "x"));
        changes.table_mut("notes").deleted.push("a".into());
        assert!(matches!(
            changes.validate(),
            Err(ProtocolError::DuplicateRecord { .. })
        ));
    }

    #[test]
    fn created_as_updated_moves_everything() {
        let mut changes = Changeset::new();
        changes.table_mut("notes").created.push(note("a", "x"));
        changes.table_mut("notes").updated.push(note("b", "y"));
        changes.table_mut("notes").deleted.push("c".into());

        let sent = changes.created_as_updated();
        let notes = sent.table("notes").unwrap();
        assert!(notes.created.is_empty());
        assert_eq!(notes.updated.len(), 2);
        assert_eq!(notes.deleted, vec!["c"]);
        assert_eq!(sent.record_count(), 3);
    }

    fn arb_table() -> impl Strategy<Value = TableChanges> {
        let id = prop::sample::select(vec!["a", "b", "c", "d", "e"]);
        (
            prop::collection::vec(id.clone(), 0..6),
            prop::collection::vec(id.clone(), 0..6),
            prop::collection::vec(id, 0..6),
        )
            .prop_map(|(created, updated, deleted)| TableChanges {
                created: created.into_iter().map(|id| note(id, "c")).collect(),
                updated: updated.into_iter().map(|id| note(id, "u")).collect(),
                deleted: deleted.into_iter().map(str::to_string).collect(),
            })
    }

    proptest! {
        #[test]
        fn normalized_changesets_are_disjoint(table in arb_table()) {
            let all_ids: HashSet<String> = table
                .created
                .iter()
                .chain(table.updated.iter())
                .filter_map(|r| r.id().map(str::to_string))
                .chain(table.deleted.iter().cloned())
                .collect();

            let changes: Changeset = [("notes".to_string(), table)].into_iter().collect();
            let normalized = changes.normalize().unwrap();
            prop_assert!(normalized.validate().is_ok());

            // No id is lost by normalization.
            let kept = normalized.table("notes").map(|t| t.len()).unwrap_or(0);
            prop_assert_eq!(kept, all_ids.len());
        }
    }
}
