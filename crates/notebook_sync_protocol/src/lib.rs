//! # Notebook Sync Protocol
//!
//! Sync protocol types and JSON wire shapes for the notebook sync core.
//!
//! This crate provides:
//! - `Cursor` and `SchemaVersion` for the versioning model
//! - `Record`, `TableChanges` and `Changeset` for change batches
//! - `MigrationDescriptor` and `MigrationStep` for schema catch-up
//! - Protocol messages (Pull, Push)
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod changeset;
mod cursor;
mod error;
mod messages;
mod migration;
mod record;

pub use changeset::{Changeset, TableChanges};
pub use cursor::{Cursor, SchemaVersion};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{PullQuery, PullRequest, PullResponse, PushRequest};
pub use migration::{MigrationDescriptor, MigrationOperation, MigrationStep};
pub use record::Record;
