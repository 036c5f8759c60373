//! Status command implementation.

use super::{open_store, CommandResult};
use notebook_sync_engine::LocalStore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Store status.
#[derive(Debug, Serialize)]
pub struct StatusResult {
    /// Committed cursor, if ever synced.
    pub last_pulled_at: Option<i64>,
    /// Local schema version.
    pub schema_version: u32,
    /// Schema version last announced by the server.
    pub server_schema_version: Option<u32>,
    /// Unacknowledged local changes.
    pub pending_changes: usize,
    /// Record count per table.
    pub tables: BTreeMap<String, usize>,
}

/// Runs the status command.
pub fn run(store_path: &Path, format: &str) -> CommandResult<()> {
    let result = status(store_path)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    match result.last_pulled_at {
        Some(cursor) => println!("Last pulled at:  {cursor}"),
        None => println!("Last pulled at:  never"),
    }
    println!("Schema version:  {}", result.schema_version);
    if let Some(server) = result.server_schema_version {
        println!("Server schema:   {server}");
    }
    println!("Pending changes: {}", result.pending_changes);
    for (table, count) in &result.tables {
        println!("  {table}: {count}");
    }
    Ok(())
}

fn status(store_path: &Path) -> CommandResult<StatusResult> {
    let store = open_store(store_path)?;
    let schema = store.schema();
    Ok(StatusResult {
        last_pulled_at: store.last_pulled_at()?.map(|c| c.timestamp()),
        schema_version: schema.version,
        server_schema_version: store.known_server_schema_version()?,
        pending_changes: store.pending_count(),
        tables: schema
            .tables
            .keys()
            .map(|table| (table.clone(), store.count(table)))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notebook_sync_protocol::Record;

    #[test]
    fn status_of_missing_store_is_empty_notebook() {
        let dir = tempfile::tempdir().unwrap();
        let result = status(&dir.path().join("store.json")).unwrap();
        assert_eq!(result.last_pulled_at, None);
        assert_eq!(result.pending_changes, 0);
        assert_eq!(result.tables.get("entries"), Some(&0));
    }

    #[test]
    fn status_counts_pending_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = open_store(&path).unwrap();
        store
            .create("entries", Record::new("a").with("title", "x"))
            .unwrap();
        store.save(&path).unwrap();

        let result = status(&path).unwrap();
        assert_eq!(result.pending_changes, 1);
        assert_eq!(result.tables.get("entries"), Some(&1));
    }
}
