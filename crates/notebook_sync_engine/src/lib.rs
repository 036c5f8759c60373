//! # Notebook Sync Engine
//!
//! Offline-first sync core for the notebook.
//!
//! This crate provides:
//! - Session credential retrieval from secure storage
//! - Pull and push clients over an abstract transport (HTTP via `reqwest`)
//! - The local store boundary, with an in-memory reference store
//! - The sync coordinator state machine
//! - Caller-level retry with exponential backoff
//!
//! ## Architecture
//!
//! The engine implements a **pull-then-push** synchronization model:
//! 1. Pull remote changes since the last committed cursor
//! 2. Apply them (and any schema migration) to the local store
//! 3. Push the local change log, tagged with the pulled cursor
//! 4. Commit the cursor and clear the acknowledged changes
//!
//! ## Key Invariants
//!
//! - Pull always happens before push
//! - The cursor only moves after a push succeeds, and never backwards
//! - Pushes are idempotent (created records travel as updates)
//! - At most one cycle runs at a time per coordinator

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod coordinator;
mod credential;
mod error;
mod http;
mod memory_store;
mod pull;
mod push;
mod store;
mod transport;

pub use config::{RetryConfig, SyncConfig, DEFAULT_CREDENTIAL_KEY};
pub use coordinator::{SyncCoordinator, SyncOutcome, SyncState, SyncStats};
pub use credential::{
    AuthHeader, CookieEntry, CredentialProvider, FileSecureStorage, MemorySecureStorage,
    SecureStorage, SessionCookies,
};
pub use error::{SyncError, SyncResult};
pub use http::HttpTransport;
pub use memory_store::{ChangeKind, MemoryStore, Schema};
pub use pull::{PullClient, PulledChanges};
pub use push::PushClient;
pub use store::{
    AppliedPull, FieldLevelMerge, LocalChanges, LocalStore, MergePolicy, ServerWins, SyncCommit,
};
pub use transport::{MockTransport, SyncTransport};

pub use notebook_sync_protocol as protocol;
