//! CLI command implementations.

pub mod edit;
pub mod serve;
pub mod session;
pub mod status;
pub mod sync;

use notebook_sync_engine::{MemoryStore, Schema, SyncError};
use std::path::Path;

/// Result type for commands.
pub type CommandResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Tables of a fresh notebook.
pub fn notebook_schema() -> Schema {
    Schema::new(1)
        .table("entries", &["title", "body", "collection_id"])
        .table("collections", &["name"])
        .table("setlists", &["name", "entry_ids"])
}

/// Loads the store snapshot at `path`, or starts an empty notebook.
pub fn open_store(path: &Path) -> Result<MemoryStore, SyncError> {
    if path.exists() {
        MemoryStore::load(path)
    } else {
        Ok(MemoryStore::new(notebook_schema()))
    }
}
