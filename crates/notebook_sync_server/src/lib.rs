//! # Notebook Sync Server
//!
//! Reference HTTP sync server for the offline-first notebook.
//!
//! This crate provides:
//! - HTTP endpoints (session, pull, push) on `axum`
//! - An in-memory record store with tombstones and a monotonic clock
//! - Session cookies signed with HMAC-SHA256
//! - Stale-push detection
//!
//! # Protocol
//!
//! Clients pull before they push:
//! 1. `GET /sync/pull` returns everything stamped after the client cursor,
//!    plus a new cursor
//! 2. `POST /sync/push` upserts the client's records, tagged with that cursor
//! 3. A push touching a record changed after the cursor is rejected with
//!    `409`; the client pulls again and retries
//!
//! Records are state, not operations: resending an identical push is
//! accepted and changes nothing.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod server;
mod store;

pub use auth::{
    session_from_cookie_header, IssuedSession, SessionBlobEntry, SessionSigner, SESSION_COOKIE,
};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use server::SyncServer;
pub use store::{Clock, PushSummary, ServerStore};
