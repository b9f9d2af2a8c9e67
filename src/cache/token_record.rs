use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::error;

use crate::cache::token::{RefreshParams, Token};
use crate::helpers::time::never;
use crate::observability::metrics::get_metrics;
use crate::persistence::backup::BackupEntry;

/// Completion listener of a refresh: `(success, value)`.
pub type RefreshCallback = Box<dyn FnOnce(bool, Option<String>) + Send + 'static>;

/// Observable state of a shared token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Uninitialized,
    Valid,
    Refreshing,
    Invalid,
}

/// Where the record stands when no fetch/refresh is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenStatus {
    Uninitialized,
    Valid,
    /// terminal, only a restore brings the record back
    Invalid,
}

/// How an in-flight fetch/refresh ended.
#[derive(Debug)]
pub enum Settlement {
    Refreshed(Token),
    /// the auth server explicitly said no
    Refused,
    /// transport error or shutdown, the previous value stays
    Failed,
}

/// Result of asking for a refresh slot.
pub enum RefreshGate {
    /// caller owns the slot and must launch the operation
    Started,
    /// an operation is already in flight, the callback was queued on it
    Joined,
    /// record is invalid; the callback is handed back to be notified outside the lock
    Rejected(Option<RefreshCallback>),
}

struct RecordState {
    value: Option<String>,
    expires_at: DateTime<Utc>,
    status: TokenStatus,
    refreshing: bool,
    usage_count: i64,
    refresh_parameters: RefreshParams,
    pending_callbacks: Vec<RefreshCallback>,
}

/// Shared token of one token type. Every field sits behind the record's own lock;
/// the lock is never held across an await point.
pub struct TokenRecord {
    token_type: String,
    state: Mutex<RecordState>,
}

impl TokenRecord {
    /// Fresh record whose initial fetch is about to start: it owns the refresh slot
    /// from the very beginning so no refresh can race the initial fetch.
    pub fn pending(token_type: &str) -> Self {
        Self {
            token_type: token_type.to_owned(),
            state: Mutex::new(RecordState {
                value: None,
                expires_at: never(),
                status: TokenStatus::Uninitialized,
                refreshing: true,
                usage_count: 0,
                refresh_parameters: RefreshParams::new(),
                pending_callbacks: Vec::new(),
            }),
        }
    }

    pub fn restored(token_type: &str, entry: &BackupEntry) -> Self {
        Self {
            token_type: token_type.to_owned(),
            state: Mutex::new(RecordState {
                value: Some(entry.value.clone()),
                expires_at: entry.expires_at,
                status: TokenStatus::Valid,
                refreshing: false,
                usage_count: entry.usage_count,
                refresh_parameters: entry.refresh_parameters.clone(),
                pending_callbacks: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecordState> {
        // a panic elsewhere must not make the token unreadable
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn state(&self) -> TokenState {
        let state = self.lock();
        if state.refreshing {
            return TokenState::Refreshing;
        }
        match state.status {
            TokenStatus::Uninitialized => TokenState::Uninitialized,
            TokenStatus::Valid => TokenState::Valid,
            TokenStatus::Invalid => TokenState::Invalid,
        }
    }

    /// Value served to callers. A refreshing record keeps serving its previous value.
    pub fn current_value(&self) -> Option<String> {
        let state = self.lock();
        match state.status {
            TokenStatus::Invalid => None,
            _ => state.value.clone(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.lock().expires_at
    }

    pub fn usage_count(&self) -> i64 {
        self.lock().usage_count
    }

    pub fn adjust_usage(&self, delta: i64) {
        self.lock().usage_count += delta;
    }

    pub fn refresh_parameters(&self) -> RefreshParams {
        self.lock().refresh_parameters.clone()
    }

    pub fn set_refresh_parameters(&self, params: RefreshParams) {
        self.lock().refresh_parameters = params;
    }

    pub fn needs_refresh(&self, now: DateTime<Utc>, refresh_ahead: ChronoDuration) -> bool {
        let state = self.lock();
        if state.status == TokenStatus::Invalid || state.refreshing {
            return false;
        }
        now.checked_add_signed(refresh_ahead).map_or(true, |edge| state.expires_at <= edge)
    }

    /// Single-flight gate shared by the initial fetch and every refresh.
    pub fn begin_refresh(&self, callback: Option<RefreshCallback>) -> RefreshGate {
        let mut state = self.lock();
        if state.status == TokenStatus::Invalid {
            return RefreshGate::Rejected(callback);
        }
        if let Some(callback) = callback {
            state.pending_callbacks.push(callback);
        }
        if state.refreshing {
            return RefreshGate::Joined;
        }
        state.refreshing = true;
        RefreshGate::Started
    }

    /// Applies the outcome, releases the slot and drains the queued callbacks,
    /// all in one critical section. Callbacks run later, outside the lock.
    pub fn settle(&self, settlement: Settlement) -> Settled {
        let mut state = self.lock();
        let (success, value) = match settlement {
            Settlement::Refreshed(token) => {
                state.value = Some(token.value.clone());
                state.expires_at = token.expires_at;
                state.status = TokenStatus::Valid;
                get_metrics()
                    .token_expiry_unix
                    .with_label_values(&[self.token_type.as_str()])
                    .set(token.expires_at.timestamp());
                (true, Some(token.value))
            }
            Settlement::Refused => {
                state.value = None;
                state.status = TokenStatus::Invalid;
                (false, None)
            }
            Settlement::Failed => (false, None),
        };
        let callbacks = std::mem::take(&mut state.pending_callbacks);
        state.refreshing = false;
        Settled { success, value, callbacks }
    }

    /// Backup view of the record; only valid tokens that are still alive qualify.
    pub fn backup_entry(&self, now: DateTime<Utc>) -> Option<BackupEntry> {
        let state = self.lock();
        if state.status != TokenStatus::Valid || state.expires_at <= now {
            return None;
        }
        let value = state.value.clone()?;
        Some(BackupEntry {
            token_type: self.token_type.clone(),
            value,
            expires_at: state.expires_at,
            refresh_parameters: state.refresh_parameters.clone(),
            usage_count: state.usage_count,
        })
    }

    /// Overwrites the record with backup data unless it currently holds a live token.
    /// An in-flight operation keeps its slot and will commit its own outcome.
    pub fn merge_restored(&self, entry: &BackupEntry, now: DateTime<Utc>) -> bool {
        let mut state = self.lock();
        let live = state.status == TokenStatus::Valid && state.expires_at > now;
        if live {
            return false;
        }
        state.value = Some(entry.value.clone());
        state.expires_at = entry.expires_at;
        state.status = TokenStatus::Valid;
        state.usage_count = entry.usage_count;
        state.refresh_parameters = entry.refresh_parameters.clone();
        true
    }
}

/// Outcome of a settled operation together with the callbacks waiting for it.
pub struct Settled {
    pub success: bool,
    pub value: Option<String>,
    callbacks: Vec<RefreshCallback>,
}

impl Settled {
    /// Invokes every drained callback once, in enqueue order. A panicking callback
    /// is logged and does not stop the rest.
    pub fn notify(self, token_type: &str) {
        for callback in self.callbacks {
            invoke_callback(token_type, callback, self.success, self.value.clone());
        }
    }
}

/// Runs one listener, containing a panic to that listener.
pub fn invoke_callback(token_type: &str, callback: RefreshCallback, success: bool, value: Option<String>) {
    if catch_unwind(AssertUnwindSafe(move || callback(success, value))).is_err() {
        error!(token_type, "refresh callback panicked");
        get_metrics().callback_failures.inc();
    }
}
