//! HTTP transport implementation.
//!
//! Speaks the JSON wire protocol over `reqwest`:
//! - `GET {base}/sync/pull` with the pull query string
//! - `POST {base}/sync/push` with a JSON body
//!
//! The session goes out as a `Cookie` header. Request timeouts are enforced
//! by the client and surface as ordinary transport failures.

use crate::config::SyncConfig;
use crate::credential::AuthHeader;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use notebook_sync_protocol::{PullRequest, PullResponse, PushRequest};
use reqwest::header::COOKIE;
use reqwest::{Client, Response};
use tracing::debug;

/// HTTP-based sync transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// Base URL of the sync server, without a trailing slash.
    base_url: String,
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with the timeout from `config`.
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("http client: {e}")))?;
        Ok(Self::with_client(&config.server_url, client))
    }

    /// Creates a transport around an existing client.
    pub fn with_client(base_url: &str, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }
}

/// Describes a transport error without leaking the request URL twice.
fn describe(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        format!("server unreachable: {error}")
    } else {
        error.to_string()
    }
}

/// Returns the body of a non-success response as the error payload.
async fn error_body(response: Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {e}>"))
}

impl SyncTransport for HttpTransport {
    async fn pull(&self, request: &PullRequest, auth: &AuthHeader) -> SyncResult<PullResponse> {
        let query = request.to_query()?;
        debug!(cursor = ?request.last_pulled_at, schema = request.schema_version, "GET /sync/pull");

        let response = self
            .client
            .get(self.url("/sync/pull"))
            .header(COOKIE, auth.as_str())
            .query(&query)
            .send()
            .await
            .map_err(|e| SyncError::pull_transport(describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::pull_status(
                status.as_u16(),
                error_body(response).await,
            ));
        }

        response
            .json::<PullResponse>()
            .await
            .map_err(|e| SyncError::pull_transport(format!("invalid pull response: {e}")))
    }

    async fn push(&self, request: &PushRequest, auth: &AuthHeader) -> SyncResult<()> {
        debug!(
            cursor = %request.last_pulled_at,
            records = request.changes.record_count(),
            "POST /sync/push"
        );

        let response = self
            .client
            .post(self.url("/sync/push"))
            .header(COOKIE, auth.as_str())
            .json(request)
            .send()
            .await
            .map_err(|e| SyncError::push_transport(describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::push_status(
                status.as_u16(),
                error_body(response).await,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn base_url_is_trimmed() {
        let config = SyncConfig::new("http://127.0.0.1:9/");
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.base_url(), "http://127.0.0.1:9");
        assert_eq!(transport.url("/sync/pull"), "http://127.0.0.1:9/sync/pull");
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_failure() {
        // Port 9 (discard) is not expected to accept HTTP connections.
        let config = SyncConfig::new("http://127.0.0.1:9").with_timeout(Duration::from_secs(2));
        let transport = HttpTransport::new(&config).unwrap();

        let result = transport
            .pull(&PullRequest::new(None, 1), &AuthHeader::new("session=x"))
            .await;
        assert!(matches!(result, Err(SyncError::PullFailed { status: None, .. })));
    }
}
