//! Sync command implementation.

use super::{open_store, CommandResult};
use notebook_sync_engine::{
    CredentialProvider, FileSecureStorage, HttpTransport, RetryConfig, SyncConfig,
    SyncCoordinator,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Runs one sync cycle (or several, with retries) and saves the store.
pub async fn run(
    server: &str,
    store_path: &Path,
    dir: &Path,
    retries: u32,
    timeout_secs: u64,
) -> CommandResult<()> {
    let config = SyncConfig::new(server)
        .with_timeout(Duration::from_secs(timeout_secs))
        .with_retry(RetryConfig::new(retries.max(1)));

    let store = Arc::new(open_store(store_path)?);
    let transport = Arc::new(HttpTransport::new(&config)?);
    let credentials = CredentialProvider::new(
        FileSecureStorage::new(dir),
        config.credential_key.clone(),
    );
    let coordinator = SyncCoordinator::new(&config, credentials, transport, Arc::clone(&store));

    let outcome = coordinator.run_with_retry(&config.retry).await;
    store.save(store_path)?;

    println!("{}", outcome.message);
    if !outcome.success {
        return Err(outcome.message.into());
    }
    println!("pulled {} / pushed {}", outcome.pulled, outcome.pushed);
    Ok(())
}
