//! Sync coordinator state machine.

use crate::config::{RetryConfig, SyncConfig};
use crate::credential::CredentialProvider;
use crate::error::{SyncError, SyncResult};
use crate::pull::PullClient;
use crate::push::PushClient;
use crate::store::{LocalStore, SyncCommit};
use crate::transport::SyncTransport;
use chrono::{DateTime, Utc};
use notebook_sync_protocol::{Cursor, MigrationDescriptor};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The phase a sync cycle is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle running.
    Idle,
    /// Reading the stored session.
    AcquiringCredential,
    /// Waiting for the server's changes.
    Pulling,
    /// Folding pulled changes and migrations into the local store.
    ApplyingPull,
    /// Sending local changes.
    Pushing,
    /// Recording the new cursor and clearing acknowledged changes.
    Committing,
}

impl SyncState {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncState::Idle)
    }
}

/// Result of one sync cycle, shown to the caller as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    /// Whether the cycle completed and committed.
    pub success: bool,
    /// Short human-readable status.
    pub message: String,
    /// Wall time of the cycle.
    pub duration: Duration,
    /// Records applied from the server.
    pub pulled: usize,
    /// Records sent to the server.
    pub pushed: usize,
    /// Committed cursor after the cycle.
    pub cursor: Option<Cursor>,
}

/// Counters across cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles that committed.
    pub cycles_completed: u64,
    /// Cycles that failed or were rejected.
    pub cycles_failed: u64,
    /// Total records applied from the server.
    pub records_pulled: u64,
    /// Total records sent to the server.
    pub records_pushed: u64,
    /// Retries issued by [`SyncCoordinator::run_with_retry`].
    pub retries: u64,
    /// Message of the last failure, cleared on success.
    pub last_error: Option<String>,
    /// When the last outcome was produced.
    pub last_outcome_at: Option<DateTime<Utc>>,
}

struct CycleReport {
    pulled: usize,
    pushed: usize,
    cursor: Cursor,
}

/// Runs pull-then-push cycles against one server for one local store.
///
/// A cycle either commits fully (cursor advanced, pushed changes cleared)
/// or leaves the cursor and the change log as they were. Pulled records
/// applied before a failed push stay applied; the next pull re-delivers
/// them and applying them again is a no-op.
pub struct SyncCoordinator<T: SyncTransport, S: LocalStore> {
    credentials: CredentialProvider,
    pull: PullClient<T>,
    push: PushClient<T>,
    store: Arc<S>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    in_flight: AtomicBool,
}

impl<T: SyncTransport, S: LocalStore> SyncCoordinator<T, S> {
    /// Creates a coordinator.
    pub fn new(
        config: &SyncConfig,
        credentials: CredentialProvider,
        transport: Arc<T>,
        store: Arc<S>,
    ) -> Self {
        Self {
            credentials,
            pull: PullClient::new(Arc::clone(&transport)),
            push: PushClient::new(transport, config.send_created_as_updated),
            store,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the local store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn set_state(&self, state: SyncState) {
        debug!(?state, "sync state");
        *self.state.write() = state;
    }

    /// Runs one cycle. Never fails; the outcome carries the error text.
    ///
    /// A call made while another cycle is running is rejected without
    /// touching the store or the network.
    pub async fn run(&self) -> SyncOutcome {
        self.attempt().await.0
    }

    /// Runs whole cycles until one succeeds, an error is not retryable,
    /// or `retry.max_attempts` is reached.
    pub async fn run_with_retry(&self, retry: &RetryConfig) -> SyncOutcome {
        let mut attempt = 0;
        loop {
            let (outcome, error) = self.attempt().await;
            attempt += 1;

            let retryable = error.as_ref().is_some_and(SyncError::is_retryable);
            if outcome.success || !retryable || attempt >= retry.max_attempts {
                return outcome;
            }

            let delay = retry.delay_for_attempt(attempt);
            warn!(attempt, ?delay, message = %outcome.message, "sync failed, retrying");
            self.stats.write().retries += 1;
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(&self) -> (SyncOutcome, Option<SyncError>) {
        let start = Instant::now();

        let Some(_guard) = InFlightGuard::acquire(self) else {
            let error = SyncError::AlreadyRunning;
            let outcome = self.failure(&error, start.elapsed());
            return (outcome, Some(error));
        };

        match self.cycle().await {
            Ok(report) => {
                let duration = start.elapsed();
                let outcome = SyncOutcome {
                    success: true,
                    message: format!("Synced in {:.1}s", duration.as_secs_f64()),
                    duration,
                    pulled: report.pulled,
                    pushed: report.pushed,
                    cursor: Some(report.cursor),
                };
                {
                    let mut stats = self.stats.write();
                    stats.cycles_completed += 1;
                    stats.records_pulled += report.pulled as u64;
                    stats.records_pushed += report.pushed as u64;
                    stats.last_error = None;
                    stats.last_outcome_at = Some(Utc::now());
                }
                info!(
                    pulled = report.pulled,
                    pushed = report.pushed,
                    cursor = %report.cursor,
                    "sync complete"
                );
                (outcome, None)
            }
            Err(error) => {
                warn!(%error, "sync failed");
                let outcome = self.failure(&error, start.elapsed());
                (outcome, Some(error))
            }
        }
    }

    fn failure(&self, error: &SyncError, duration: Duration) -> SyncOutcome {
        let message = error.user_message();
        {
            let mut stats = self.stats.write();
            stats.cycles_failed += 1;
            stats.last_error = Some(message.clone());
            stats.last_outcome_at = Some(Utc::now());
        }
        SyncOutcome {
            success: false,
            message,
            duration,
            pulled: 0,
            pushed: 0,
            cursor: self.store.last_pulled_at().ok().flatten(),
        }
    }

    async fn cycle(&self) -> SyncResult<CycleReport> {
        self.set_state(SyncState::AcquiringCredential);
        let auth = self.credentials.get_auth_header()?;

        self.set_state(SyncState::Pulling);
        let cursor = self.store.last_pulled_at()?;
        let local_version = self.store.schema_version()?;
        let migration = self
            .store
            .known_server_schema_version()?
            .and_then(|target| MigrationDescriptor::between(local_version, target));
        let pulled = self
            .pull
            .pull(cursor, local_version, migration, &auth)
            .await?;

        self.set_state(SyncState::ApplyingPull);
        let applied = self
            .store
            .apply_pull(&pulled.changeset, &pulled.migrations)
            .map_err(apply_failed)?;
        if applied.schema_version != local_version {
            info!(from = local_version, to = applied.schema_version, "schema migrated");
        }

        self.set_state(SyncState::Pushing);
        let local = self.store.local_changes()?;
        let pushed = self
            .push
            .push(local.changeset, pulled.new_cursor, &auth)
            .await?;

        self.set_state(SyncState::Committing);
        self.store.commit(SyncCommit {
            cursor: pulled.new_cursor,
            watermark: local.watermark,
            server_schema_version: pulled.server_schema_version,
        })?;

        Ok(CycleReport {
            pulled: applied.records,
            pushed,
            cursor: pulled.new_cursor,
        })
    }
}

fn apply_failed(error: SyncError) -> SyncError {
    match error {
        SyncError::ApplyFailed(_) => error,
        other => SyncError::ApplyFailed(other.to_string()),
    }
}

/// Holds the in-flight flag for the life of one cycle.
///
/// Dropping it, including when the cycle future is cancelled, releases the
/// flag and returns the state to idle.
struct InFlightGuard<'a, T: SyncTransport, S: LocalStore> {
    coordinator: &'a SyncCoordinator<T, S>,
}

impl<'a, T: SyncTransport, S: LocalStore> InFlightGuard<'a, T, S> {
    fn acquire(coordinator: &'a SyncCoordinator<T, S>) -> Option<Self> {
        coordinator
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { coordinator })
    }
}

impl<T: SyncTransport, S: LocalStore> Drop for InFlightGuard<'_, T, S> {
    fn drop(&mut self) {
        *self.coordinator.state.write() = SyncState::Idle;
        self.coordinator.in_flight.store(false, Ordering::Release);
    }
}
