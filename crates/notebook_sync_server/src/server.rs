//! HTTP sync server.

use crate::auth::SessionBlobEntry;
use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::{HandlerContext, RequestHandler};
use crate::store::ServerStore;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use notebook_sync_protocol::{PullQuery, PullRequest, PullResponse, PushRequest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// The sync server.
///
/// Serves the JSON sync protocol over HTTP:
///
/// - `GET /health`: liveness, no auth
/// - `POST /auth/session`: issues a session cookie blob for a user
/// - `GET /sync/pull`: changes since a cursor
/// - `POST /sync/push`: local changes based on a cursor
///
/// # Example
///
/// ```no_run
/// use notebook_sync_server::{ServerConfig, SyncServer};
///
/// # async fn run() -> notebook_sync_server::ServerResult<()> {
/// let server = SyncServer::new(ServerConfig::default().with_auth(b"secret".to_vec()));
/// server.serve(async { let _ = tokio::signal::ctrl_c().await; }).await
/// # }
/// ```
pub struct SyncServer {
    handler: Arc<RequestHandler>,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a new sync server with an empty store.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(ServerStore::new()))
    }

    /// Creates a sync server around an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<ServerStore>) -> Self {
        let context = Arc::new(HandlerContext::new(config, store));
        let handler = Arc::new(RequestHandler::new(Arc::clone(&context)));
        Self { handler, context }
    }

    /// Returns the record store.
    pub fn store(&self) -> &Arc<ServerStore> {
        &self.context.store
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Builds the router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/auth/session", post(create_session))
            .route("/sync/pull", get(pull))
            .route("/sync/push", post(push))
            .with_state(Arc::clone(&self.handler))
            .layer(TraceLayer::new_for_http())
    }

    /// Serves on the configured address until `shutdown` resolves.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> ServerResult<()> {
        let listener = TcpListener::bind(self.config().bind_addr).await?;
        info!(addr = %listener.local_addr()?, "sync server listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }

    /// Binds the configured address and serves in a background task.
    ///
    /// Returns the bound address, so port `0` can be used in tests.
    pub async fn spawn(self) -> ServerResult<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config().bind_addr).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "sync server stopped");
            }
        });
        info!(%addr, "sync server spawned");
        Ok((addr, handle))
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Body of `POST /auth/session`.
#[derive(Debug, Deserialize)]
struct SessionRequest {
    user: String,
}

async fn create_session(
    State(handler): State<Arc<RequestHandler>>,
    Json(request): Json<SessionRequest>,
) -> ServerResult<Json<BTreeMap<String, SessionBlobEntry>>> {
    let session = handler.handle_session(&request.user, Utc::now())?;
    Ok(Json(session.to_blob()))
}

fn cookie_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
}

async fn pull(
    State(handler): State<Arc<RequestHandler>>,
    headers: HeaderMap,
    Query(query): Query<PullQuery>,
) -> ServerResult<Json<PullResponse>> {
    handler.authorize(cookie_header(&headers), Utc::now())?;
    let request = PullRequest::try_from(query)?;
    Ok(Json(handler.handle_pull(request)?))
}

async fn push(
    State(handler): State<Arc<RequestHandler>>,
    headers: HeaderMap,
    Json(request): Json<PushRequest>,
) -> ServerResult<StatusCode> {
    handler.authorize(cookie_header(&headers), Utc::now())?;
    handler.handle_push(request)?;
    Ok(StatusCode::OK)
}
