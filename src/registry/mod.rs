//! Process-wide token registry.
//!
//! Ties the token store, the visitor ledger, the auth server and the backup manager
//! together. One registry is built at startup and handed to callers by clone; every
//! clone shares the same state. Background work (initial fetches, refreshes,
//! snapshots, periodic jobs) runs on a task tracker so `shutdown` can drain it.

use anyhow::Result;
use chrono::Duration as ChronoDuration;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::cache::token::RefreshParams;
use crate::cache::token_record::{invoke_callback, RefreshCallback, RefreshGate, TokenRecord, TokenState};
use crate::cache::token_store::TokenStore;
use crate::cache::visitor_ledger::VisitorLedger;
use crate::config::settings::SettingsConfig;
use crate::helpers::time::{now, to_chrono};
use crate::observability::metrics::get_metrics;
use crate::persistence::manager::{BackupManager, SnapshotOutcome};
use crate::resilience::retry::RetrySettings;
use crate::scheduler::jobs;
use crate::sources::AuthServer;
use crate::utils::constants::*;

pub mod executor;
pub mod token_context;
pub mod visitors;

pub use token_context::TokenContext;

/// Runtime view of `settings`, defaults applied.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub refresh_ahead: ChronoDuration,
    pub initial_fetch_retry: RetrySettings,
    pub backup_path: PathBuf,
    pub backup_interval: Duration,
    pub backup_max_age: ChronoDuration,
    pub cleanup_interval: Duration,
    pub inactivity_threshold: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self::from(&SettingsConfig::default())
    }
}

impl From<&SettingsConfig> for RegistrySettings {
    fn from(settings: &SettingsConfig) -> Self {
        let refresh_ahead = settings.refresh_ahead_seconds.unwrap_or(DEFAULT_REFRESH_AHEAD_SECS);
        Self {
            refresh_ahead: to_chrono(Duration::from_secs(refresh_ahead)),
            initial_fetch_retry: RetrySettings::from(settings.initial_fetch_retry.as_ref()),
            backup_path: PathBuf::from(&settings.backup.path),
            backup_interval: Duration::from_secs(settings.backup.interval_seconds),
            backup_max_age: to_chrono(Duration::from_secs(
                settings.backup.max_age_hours.saturating_mul(60 * 60),
            )),
            cleanup_interval: Duration::from_secs(settings.cleanup.interval_seconds),
            inactivity_threshold: Duration::from_secs(settings.cleanup.inactivity_threshold_seconds),
        }
    }
}

#[derive(Clone)]
pub struct TokenRegistry {
    store: TokenStore,
    ledger: VisitorLedger,
    auth: Arc<dyn AuthServer>,
    backup: BackupManager,
    settings: Arc<RegistrySettings>,
    tracker: TaskTracker,
    /// stops everything, including in-flight auth server calls
    cancel: CancellationToken,
    /// child of `cancel`; `stop_jobs` cancels it alone
    jobs_cancel: CancellationToken,
    runtime: Handle,
}

impl TokenRegistry {
    /// Builds an idle registry bound to the current tokio runtime.
    /// Nothing is restored and no periodic job runs until `start`/`start_jobs`.
    pub fn new(settings: RegistrySettings, auth: Arc<dyn AuthServer>) -> Result<Self> {
        let runtime = Handle::try_current()?;
        let cancel = CancellationToken::new();
        Ok(Self {
            store: TokenStore::new(),
            ledger: VisitorLedger::new(),
            auth,
            backup: BackupManager::new(settings.backup_path.clone(), settings.backup_max_age),
            settings: Arc::new(settings),
            tracker: TaskTracker::new(),
            jobs_cancel: cancel.child_token(),
            cancel,
            runtime,
        })
    }

    /// New registry with the backup restored and the periodic jobs running.
    pub async fn start(settings: RegistrySettings, auth: Arc<dyn AuthServer>) -> Result<Self> {
        let registry = Self::new(settings, auth)?;
        registry.restore(None).await;
        if registry.store.is_empty() {
            info!("no tokens restored, every token type starts with an initial fetch");
        }
        registry.start_jobs();
        get_metrics().up.set(1);
        Ok(registry)
    }

    pub fn start_jobs(&self) {
        jobs::spawn_backup_job(self.clone());
        jobs::spawn_cleanup_job(self.clone());
    }

    /// Stops the periodic backup and cleanup jobs. Tokens keep being served and
    /// refreshed; jobs cannot be restarted afterwards.
    pub fn stop_jobs(&self) {
        if !self.jobs_cancel.is_cancelled() {
            info!("stopping periodic jobs");
            self.jobs_cancel.cancel();
        }
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn ledger(&self) -> &VisitorLedger {
        &self.ledger
    }

    /// Fires when the registry shuts down.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn jobs_cancellation(&self) -> &CancellationToken {
        &self.jobs_cancel
    }

    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn_on(task, &self.runtime);
    }

    /// Current value for `token_type` on behalf of `visitor_id`; never waits for the network.
    /// A due token triggers a background refresh and the previous value is still served.
    pub fn get_token(&self, visitor_id: &str, token_type: &str) -> Option<String> {
        if visitor_id.is_empty() || token_type.is_empty() {
            debug!("get_token called with empty visitor id or token type");
            return None;
        }
        let now = now();
        if self.ledger.touch(visitor_id, token_type, now) {
            get_metrics().active_visitors.set(self.ledger.len() as i64);
        }

        let record = self.record(token_type);
        record.adjust_usage(1);
        if record.needs_refresh(now, self.settings.refresh_ahead) {
            self.refresh_token(token_type, None);
        }
        record.current_value()
    }

    pub fn needs_refresh(&self, token_type: &str) -> bool {
        if token_type.is_empty() {
            return false;
        }
        self.store
            .get(token_type)
            .map(|record| record.needs_refresh(now(), self.settings.refresh_ahead))
            .unwrap_or(false)
    }

    /// Starts a refresh or joins the one in flight. `callback` fires exactly once with
    /// the settled `(success, value)`; for an invalid token it fires immediately with
    /// `(false, None)`. Returns false when no refresh will happen.
    pub fn refresh_token(&self, token_type: &str, callback: Option<RefreshCallback>) -> bool {
        if token_type.is_empty() {
            return false;
        }
        let Some(record) = self.store.get(token_type) else {
            debug!(token_type, "refresh requested for unknown token type");
            return false;
        };

        match record.begin_refresh(callback) {
            RefreshGate::Started => {
                debug!(token_type, "refresh started");
                self.spawn(executor::token_refresh::refresh_token(self.clone(), record));
                true
            }
            RefreshGate::Joined => {
                get_metrics().refresh_joins.with_label_values(&[token_type]).inc();
                true
            }
            RefreshGate::Rejected(callback) => {
                debug!(token_type, "refresh rejected, token is invalid");
                if let Some(callback) = callback {
                    invoke_callback(token_type, callback, false, None);
                }
                false
            }
        }
    }

    pub fn set_refresh_params(&self, token_type: &str, params: RefreshParams) {
        if token_type.is_empty() {
            return;
        }
        self.record(token_type).set_refresh_parameters(params);
    }

    pub fn token_state(&self, token_type: &str) -> Option<TokenState> {
        self.store.get(token_type).map(|record| record.state())
    }

    pub fn token_context(&self, visitor_id: &str, token_type: &str) -> TokenContext {
        TokenContext::new(self.clone(), visitor_id, token_type)
    }

    /// Snapshot now. True only when a backup file was actually written.
    pub async fn force_backup(&self, path: Option<&Path>) -> bool {
        match self.backup.snapshot(&self.store, path).await {
            Ok(SnapshotOutcome::Written(_)) => true,
            Ok(SnapshotOutcome::Skipped) => false,
            Err(e) => {
                error!(error = ?e, "token backup failed");
                false
            }
        }
    }

    /// Best effort background snapshot; the caller never waits for it.
    pub(crate) fn request_snapshot(&self) {
        let registry = self.clone();
        self.spawn(async move {
            if let Err(e) = registry.backup.snapshot(&registry.store, None).await {
                warn!(error = ?e, "background token backup failed");
            }
        });
    }

    /// Merges a backup into the store; returns the number of tokens taken from it.
    pub async fn restore(&self, path: Option<&Path>) -> usize {
        match self.backup.restore(&self.store, path).await {
            Ok(restored) => {
                get_metrics().token_types.set(self.store.len() as i64);
                restored
            }
            Err(e) => {
                error!(error = ?e, "token restore failed");
                0
            }
        }
    }

    /// Stops the periodic jobs and in-flight operations, waits for background work,
    /// then writes a final snapshot.
    pub async fn shutdown(&self) {
        info!("token registry shutting down");
        get_metrics().up.set(0);
        self.stop_jobs();
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        if self.force_backup(None).await {
            info!("final token backup written");
        }
    }

    /// Record for `token_type`, launching its initial fetch when this call created it.
    fn record(&self, token_type: &str) -> Arc<TokenRecord> {
        let (record, created) = self.store.get_or_create(token_type);
        if created {
            info!(token_type, "new token type, initial fetch started");
            get_metrics().token_types.set(self.store.len() as i64);
            self.spawn(executor::token_fetch::fetch_initial_token(self.clone(), record.clone()));
        }
        record
    }
}
