//! Transport layer abstraction for sync operations.

use crate::credential::AuthHeader;
use crate::error::{SyncError, SyncResult};
use notebook_sync_protocol::{PullRequest, PullResponse, PushRequest};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;

/// A sync transport handles network communication with the sync server.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process loopback, mock for testing).
/// Implementations report non-success responses and transport failures as
/// [`SyncError::PullFailed`] / [`SyncError::PushFailed`].
pub trait SyncTransport: Send + Sync {
    /// Requests server changes newer than the request cursor.
    fn pull(
        &self,
        request: &PullRequest,
        auth: &AuthHeader,
    ) -> impl Future<Output = SyncResult<PullResponse>> + Send;

    /// Submits local changes.
    fn push(
        &self,
        request: &PushRequest,
        auth: &AuthHeader,
    ) -> impl Future<Output = SyncResult<()>> + Send;
}

/// A mock transport for testing.
///
/// Responses are scripted per call in FIFO order; when the queue is empty
/// the default response is used. Every request is recorded.
#[derive(Debug, Default)]
pub struct MockTransport {
    pull_responses: Mutex<VecDeque<SyncResult<PullResponse>>>,
    default_pull: Mutex<Option<PullResponse>>,
    push_failures: Mutex<VecDeque<SyncError>>,
    pulls: Mutex<Vec<PullRequest>>,
    pushes: Mutex<Vec<PushRequest>>,
    auth_headers: Mutex<Vec<String>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the response used when no scripted pull result is queued.
    pub fn set_pull_response(&self, response: PullResponse) {
        *self.default_pull.lock() = Some(response);
    }

    /// Queues a result for the next pull.
    pub fn queue_pull(&self, result: SyncResult<PullResponse>) {
        self.pull_responses.lock().push_back(result);
    }

    /// Makes the next push fail with `error`.
    pub fn fail_next_push(&self, error: SyncError) {
        self.push_failures.lock().push_back(error);
    }

    /// Returns all pull requests received.
    pub fn pulls(&self) -> Vec<PullRequest> {
        self.pulls.lock().clone()
    }

    /// Returns all push requests received, including failed ones.
    pub fn pushes(&self) -> Vec<PushRequest> {
        self.pushes.lock().clone()
    }

    /// Returns the raw auth header values received.
    pub fn auth_headers(&self) -> Vec<String> {
        self.auth_headers.lock().clone()
    }

    /// Returns the number of network calls made.
    pub fn call_count(&self) -> usize {
        self.pulls.lock().len() + self.pushes.lock().len()
    }
}

impl SyncTransport for MockTransport {
    async fn pull(&self, request: &PullRequest, auth: &AuthHeader) -> SyncResult<PullResponse> {
        self.pulls.lock().push(request.clone());
        self.auth_headers.lock().push(auth.as_str().to_string());

        if let Some(result) = self.pull_responses.lock().pop_front() {
            return result;
        }
        self.default_pull
            .lock()
            .clone()
            .ok_or_else(|| SyncError::pull_transport("no mock pull response set"))
    }

    async fn push(&self, request: &PushRequest, auth: &AuthHeader) -> SyncResult<()> {
        self.pushes.lock().push(request.clone());
        self.auth_headers.lock().push(auth.as_str().to_string());

        match self.push_failures.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notebook_sync_protocol::{Changeset, Cursor};

    #[tokio::test]
    async fn scripted_pulls_then_default() {
        let transport = MockTransport::new();
        let auth = AuthHeader::new("session=a");
        transport.queue_pull(Err(SyncError::pull_status(500, "boom")));
        transport.set_pull_response(PullResponse::new(Changeset::new(), 10));

        let request = PullRequest::new(None, 1);
        assert!(transport.pull(&request, &auth).await.is_err());
        assert_eq!(transport.pull(&request, &auth).await.unwrap().timestamp, 10);
        assert_eq!(transport.pulls().len(), 2);
    }

    #[tokio::test]
    async fn pull_without_response_fails() {
        let transport = MockTransport::new();
        let result = transport
            .pull(&PullRequest::new(None, 1), &AuthHeader::new("x=y"))
            .await;
        assert!(matches!(result, Err(SyncError::PullFailed { status: None, .. })));
    }

    #[tokio::test]
    async fn push_failures_are_one_shot() {
        let transport = MockTransport::new();
        let auth = AuthHeader::new("session=a");
        transport.fail_next_push(SyncError::push_status(503, "busy"));

        let request = PushRequest::new(Changeset::new(), Cursor::new(1));
        assert!(transport.push(&request, &auth).await.is_err());
        assert!(transport.push(&request, &auth).await.is_ok());
        assert_eq!(transport.pushes().len(), 2);
        assert_eq!(transport.auth_headers(), vec!["session=a", "session=a"]);
    }
}
