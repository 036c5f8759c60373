//! Request handlers for sync endpoints.

use crate::auth::{session_from_cookie_header, IssuedSession, SessionSigner};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::store::{PushSummary, ServerStore};
use chrono::{DateTime, Utc};
use notebook_sync_protocol::{PullRequest, PullResponse, PushRequest};
use std::sync::Arc;
use tracing::info;

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Record store (shared across all handlers).
    pub store: Arc<ServerStore>,
    signer: Option<SessionSigner>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, store: Arc<ServerStore>) -> Self {
        let signer = config
            .auth_secret
            .clone()
            .map(|secret| SessionSigner::new(secret, config.session_ttl));
        Self {
            config,
            store,
            signer,
        }
    }
}

/// Handler for sync requests, independent of the HTTP layer.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Returns the handler context.
    pub fn context(&self) -> &HandlerContext {
        &self.context
    }

    /// Checks the `Cookie` header of a sync request.
    ///
    /// Returns the signed-in user, or `None` when auth is disabled.
    pub fn authorize(
        &self,
        cookie_header: Option<&str>,
        now: DateTime<Utc>,
    ) -> ServerResult<Option<String>> {
        if !self.context.config.require_auth {
            return Ok(None);
        }
        let signer = self.signer()?;
        let value = cookie_header
            .and_then(session_from_cookie_header)
            .ok_or_else(|| ServerError::NotAuthorized("missing session cookie".into()))?;
        signer.validate(value, now).map(Some)
    }

    /// Issues a session for `user`.
    pub fn handle_session(&self, user: &str, now: DateTime<Utc>) -> ServerResult<IssuedSession> {
        let session = self.signer()?.issue(user, now)?;
        info!(user, expires = %session.expires, "issued session");
        Ok(session)
    }

    /// Handles a pull request.
    pub fn handle_pull(&self, request: PullRequest) -> ServerResult<PullResponse> {
        let config = &self.context.config;
        let (changes, cursor) = self.context.store.pull(request.last_pulled_at);

        let migrations = request
            .migration
            .map(|range| range.select(&config.migrations))
            .unwrap_or_default();

        Ok(PullResponse::new(changes, cursor.timestamp())
            .with_schema_version(config.schema_version)
            .with_migrations(migrations))
    }

    /// Handles a push request.
    pub fn handle_push(&self, request: PushRequest) -> ServerResult<PushSummary> {
        let count = request.changes.record_count();
        let max = self.context.config.max_push_records;
        if count > max {
            return Err(ServerError::PayloadTooLarge { count, max });
        }
        self.context
            .store
            .push(&request.changes, request.last_pulled_at)
    }

    fn signer(&self) -> ServerResult<&SessionSigner> {
        self.context
            .signer
            .as_ref()
            .ok_or_else(|| ServerError::NotFound("sessions are not enabled".into()))
    }
}
