//! Shared constants and invariants

/// A token is considered due for refresh this long before it actually expires.
pub const DEFAULT_REFRESH_AHEAD_SECS: u64 = 30;
pub const MAX_REFRESH_AHEAD_SECS: u64 = 60 * 60 * 24;

/// Fixed delay between initial fetch attempts (base == max -> no backoff growth).
pub const DEFAULT_INITIAL_FETCH_RETRY_DELAY_MS: u64 = 5000;

pub const DEFAULT_BACKUP_PATH: &str = "./data/token_backup.json";
pub const DEFAULT_BACKUP_INTERVAL_SECS: u64 = 5 * 60;
pub const DEFAULT_BACKUP_MAX_AGE_HOURS: u64 = 24;

pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 10 * 60;
pub const DEFAULT_INACTIVITY_THRESHOLD_SECS: u64 = 30 * 60;

// upper bounds accepted by config validation
pub const MAX_JOB_INTERVAL_SECS: u64 = 60 * 60 * 24 * 7;
pub const MAX_INACTIVITY_THRESHOLD_SECS: u64 = 60 * 60 * 24 * 30;
pub const MAX_BACKUP_MAX_AGE_HOURS: u64 = 24 * 365;
pub const MAX_TOKEN_TTL_SECS: u64 = 60 * 60 * 24 * 365;

pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: &str = "8080";
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

pub const DEFAULT_REFUSAL_STATUSES: [u16; 3] = [400, 401, 403];

// simulated auth server
pub const DEFAULT_SIMULATED_LATENCY_MS: u64 = 1000;
pub const DEFAULT_SIMULATED_TTL_SECS: u64 = 50 * 60;
pub const DEFAULT_SIMULATED_SUCCESS_RATIO: f64 = 0.95;
