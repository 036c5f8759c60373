//! Server configuration.

use notebook_sync_protocol::{MigrationStep, SchemaVersion};
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum number of records accepted in one push.
    pub max_push_records: usize,
    /// Whether to require a session cookie on sync endpoints.
    pub require_auth: bool,
    /// Secret key for session signing (if auth enabled).
    pub auth_secret: Option<Vec<u8>>,
    /// Lifetime of issued sessions.
    pub session_ttl: Duration,
    /// Schema version clients are expected to run.
    pub schema_version: SchemaVersion,
    /// Full migration history, one step per version above 1.
    pub migrations: Vec<MigrationStep>,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            max_push_records: 1000,
            require_auth: false,
            auth_secret: None,
            session_ttl: Duration::from_secs(24 * 60 * 60),
            schema_version: 1,
            migrations: Vec::new(),
        }
    }

    /// Sets the maximum push size.
    pub fn with_max_push_records(mut self, max: usize) -> Self {
        self.max_push_records = max;
        self
    }

    /// Enables authentication with the given secret.
    pub fn with_auth(mut self, secret: Vec<u8>) -> Self {
        self.require_auth = true;
        self.auth_secret = Some(secret);
        self
    }

    /// Sets the session lifetime.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Sets the expected schema version and the migration history.
    pub fn with_schema(mut self, version: SchemaVersion, migrations: Vec<MigrationStep>) -> Self {
        self.schema_version = version;
        self.migrations = migrations;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8080)))
    }
}
