use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::token_store::TokenStore;
use crate::helpers::time::{get_instant, now};
use crate::observability::metrics::get_metrics;
use crate::persistence::backup::{self, BackupSnapshot};

static SNAPSHOT_MSG: &str = "snapshot";
static RESTORE_MSG: &str = "restore";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// backup file replaced with this many tokens
    Written(usize),
    /// another snapshot was running, request dropped
    Skipped,
}

/// Snapshots the store to durable storage and merges a backup back on startup.
#[derive(Clone)]
pub struct BackupManager {
    path: Arc<PathBuf>,
    max_age: ChronoDuration,
    in_progress: Arc<AtomicBool>,
}

/// Releases the single-flight flag however the snapshot ends.
struct InProgress<'a>(&'a AtomicBool);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl BackupManager {
    pub fn new(path: PathBuf, max_age: ChronoDuration) -> Self {
        Self {
            path: Arc::new(path),
            max_age,
            in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Writes every valid, unexpired token to `path` (or the configured location).
    /// Never queues: a request arriving while a snapshot runs is dropped.
    pub async fn snapshot(&self, store: &TokenStore, path: Option<&Path>) -> Result<SnapshotOutcome> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("snapshot already running, request dropped");
            get_metrics().backup_skipped.inc();
            return Ok(SnapshotOutcome::Skipped);
        }
        let _guard = InProgress(&self.in_progress);

        let metrics = get_metrics();
        let start = get_instant();
        let path = path.unwrap_or(&self.path);
        let snapshot = build_snapshot(store, now());
        let total = snapshot.tokens.len();

        let written = backup::write_atomic(path, &snapshot).await;
        metrics
            .backup_duration
            .with_label_values(&[SNAPSHOT_MSG])
            .observe(start.elapsed().as_secs_f64());
        match written {
            Ok(()) => {
                metrics.backup_writes.inc();
                info!(tokens = total, path = %path.display(), "token backup written");
                Ok(SnapshotOutcome::Written(total))
            }
            Err(e) => {
                metrics.backup_failures.with_label_values(&[SNAPSHOT_MSG]).inc();
                Err(e)
            }
        }
    }

    /// Merges the backup at `path` (or the configured location) into the store and
    /// returns how many tokens were taken from it.
    pub async fn restore(&self, store: &TokenStore, path: Option<&Path>) -> Result<usize> {
        let metrics = get_metrics();
        let start = get_instant();
        let path = path.unwrap_or(&self.path);

        let snapshot = match backup::read(path).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                info!(path = %path.display(), "no token backup found");
                return Ok(0);
            }
            Err(e) => {
                metrics.backup_failures.with_label_values(&[RESTORE_MSG]).inc();
                return Err(e);
            }
        };

        let restored = merge_snapshot(store, &snapshot, now(), self.max_age);
        metrics.restored_tokens.inc_by(restored as u64);
        metrics
            .backup_duration
            .with_label_values(&[RESTORE_MSG])
            .observe(start.elapsed().as_secs_f64());
        Ok(restored)
    }
}

fn build_snapshot(store: &TokenStore, now: DateTime<Utc>) -> BackupSnapshot {
    let mut snapshot = BackupSnapshot::new(now);
    for record in store.records() {
        if let Some(entry) = record.backup_entry(now) {
            snapshot.tokens.insert(record.token_type().to_owned(), entry);
        }
    }
    snapshot
}

fn merge_snapshot(
    store: &TokenStore,
    snapshot: &BackupSnapshot,
    now: DateTime<Utc>,
    max_age: ChronoDuration,
) -> usize {
    if now - snapshot.backup_time > max_age {
        warn!(backup_time = %snapshot.backup_time, "token backup too old, discarded");
        return 0;
    }

    let mut restored = 0;
    for (token_type, entry) in &snapshot.tokens {
        if entry.expires_at <= now {
            debug!(token_type = %token_type, "backup token expired, skipped");
            continue;
        }
        if store.merge_restored(token_type, entry, now) {
            restored += 1;
        } else {
            debug!(token_type = %token_type, "live token kept, backup entry ignored");
        }
    }
    info!("restored {} of {} tokens from backup", restored, snapshot.tokens.len());
    restored
}
