//! Serve command implementation.

use super::CommandResult;
use notebook_sync_server::{ServerConfig, SyncServer};
use std::net::SocketAddr;
use std::time::Duration;

/// Runs the reference sync server until Ctrl-C.
pub async fn run(
    addr: SocketAddr,
    secret: Option<String>,
    max_push_records: usize,
    session_ttl_hours: u64,
) -> CommandResult<()> {
    let mut config = ServerConfig::new(addr)
        .with_max_push_records(max_push_records)
        .with_session_ttl(Duration::from_secs(session_ttl_hours * 60 * 60));
    match secret {
        Some(secret) => config = config.with_auth(secret.into_bytes()),
        None => tracing::warn!("no --secret given, sync endpoints are open"),
    }

    SyncServer::new(config)
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
            }
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
