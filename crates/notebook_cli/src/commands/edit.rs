//! Local edit commands (`put`, `delete`).

use super::{open_store, CommandResult};
use notebook_sync_protocol::Record;
use serde_json::{Map, Value};
use std::path::Path;

/// Parses `key=value` pairs; values that parse as JSON keep their type.
pub fn parse_fields(pairs: &[String]) -> CommandResult<Map<String, Value>> {
    pairs
        .iter()
        .map(|pair| {
            let (key, raw) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got {pair:?}"))?;
            if key == "id" {
                return Err("use --id to set the record id".into());
            }
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.into()));
            Ok((key.to_string(), value))
        })
        .collect()
}

/// Creates or updates a record and saves the store. Returns the record id.
pub fn put(
    store_path: &Path,
    table: &str,
    id: Option<String>,
    fields: &[String],
) -> CommandResult<String> {
    let store = open_store(store_path)?;
    let fields = parse_fields(fields)?;
    let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if store.get(table, &id).is_some() {
        store.update(table, &id, fields)?;
    } else {
        let mut record = Record::new(id.as_str());
        for (key, value) in fields {
            record.set(key, value);
        }
        store.create(table, record)?;
    }
    store.save(store_path)?;
    Ok(id)
}

/// Deletes a record and saves the store.
pub fn delete(store_path: &Path, table: &str, id: &str) -> CommandResult<()> {
    let store = open_store(store_path)?;
    store.delete(table, id)?;
    store.save(store_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notebook_sync_engine::ChangeKind;

    #[test]
    fn parse_typed_fields() {
        let fields = parse_fields(&["title=hello".into(), "pinned=true".into(), "rank=3".into()])
            .unwrap();
        assert_eq!(fields["title"], "hello");
        assert_eq!(fields["pinned"], true);
        assert_eq!(fields["rank"], 3);
        assert!(parse_fields(&["broken".into()]).is_err());
        assert!(parse_fields(&["id=x".into()]).is_err());
    }

    #[test]
    fn put_then_update_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let id = put(&path, "entries", None, &["title=first".into()]).unwrap();
        put(&path, "entries", Some(id.clone()), &["body=text".into()]).unwrap();

        let store = open_store(&path).unwrap();
        let record = store.get("entries", &id).unwrap();
        assert_eq!(record.get("title").and_then(Value::as_str), Some("first"));
        assert_eq!(record.get("body").and_then(Value::as_str), Some("text"));
        assert_eq!(store.pending_kind("entries", &id), Some(ChangeKind::Created));

        delete(&path, "entries", &id).unwrap();
        assert!(open_store(&path).unwrap().get("entries", &id).is_none());
    }
}
