use serde::Deserialize;

use crate::utils::constants::*;

/// ================================
/// Global service-wide settings
/// ================================
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SettingsConfig {
    pub refresh_ahead_seconds: Option<u64>,
    pub initial_fetch_retry: Option<RetryConfig>,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// will be mutiply by 2 on every attempt until max_delay_ms
    pub base_delay_ms: Option<u64>,
    /// max delay for retrying
    /// invariant: >= base_delay_ms.
    pub max_delay_ms: Option<u64>,
}

/// ================================
/// Backup / restore
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct BackupConfig {
    #[serde(default = "default_backup_path")]
    pub path: String,
    #[serde(default = "default_backup_interval")]
    pub interval_seconds: u64,
    /// backups older than this are discarded on restore
    #[serde(default = "default_backup_max_age")]
    pub max_age_hours: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            path: default_backup_path(),
            interval_seconds: default_backup_interval(),
            max_age_hours: default_backup_max_age(),
        }
    }
}

/// ================================
/// Inactive visitors cleanup
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct CleanupConfig {
    #[serde(default = "default_cleanup_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_inactivity_threshold")]
    pub inactivity_threshold_seconds: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_cleanup_interval(),
            inactivity_threshold_seconds: default_inactivity_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_path")]
    pub path: String,
    #[serde(default)]
    pub is_enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { path: default_metrics_path(), is_enabled: false }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: String
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_server_host(), port: default_server_port() }
    }
}

/// ================================
/// Logging
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String, // allowed: trace, debug, info, warn, error
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn new (level: String, format: LogFormat) -> Self {
        Self { level, format }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_owned(), format: LogFormat::Compact }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

fn default_backup_path() -> String {
    DEFAULT_BACKUP_PATH.to_string()
}

fn default_backup_interval() -> u64 {
    DEFAULT_BACKUP_INTERVAL_SECS
}

fn default_backup_max_age() -> u64 {
    DEFAULT_BACKUP_MAX_AGE_HOURS
}

fn default_cleanup_interval() -> u64 {
    DEFAULT_CLEANUP_INTERVAL_SECS
}

fn default_inactivity_threshold() -> u64 {
    DEFAULT_INACTIVITY_THRESHOLD_SECS
}

fn default_metrics_path() -> String {
    DEFAULT_METRICS_PATH.to_string()
}

fn default_server_host() -> String {
    DEFAULT_SERVER_HOST.to_string()
}

fn default_server_port() -> String {
    DEFAULT_SERVER_PORT.to_string()
}
