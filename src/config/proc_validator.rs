//! Configuration validation with aggregated errors.
//! - Aggregates all issues into Vec<String>
//! - Validates:
//!   * interval / retry invariants
//!   * backup path and age
//!   * auth server requests, pointers and expiration semantics
//!   * logging level and metrics path

use http::Method;
use tracing::{error, info};

use crate::config::settings::{RetryConfig, SettingsConfig};
use crate::config::sources::{
    AuthServerConfig, Expiration, ExpirationSource, GenericSourceValue, HttpAuthServerConfig,
    RequestConfig, ServiceConfig, SimulatedAuthServerConfig,
};
use crate::observability::metrics::get_metrics;
use crate::utils::constants::{
    MAX_BACKUP_MAX_AGE_HOURS, MAX_INACTIVITY_THRESHOLD_SECS, MAX_JOB_INTERVAL_SECS,
    MAX_REFRESH_AHEAD_SECS, MAX_TOKEN_TTL_SECS,
};

/// Public entrypoint: returns Ok(()) or Err(Vec<String>) containing all issues.
pub async fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    validate_settings(&cfg.settings, &mut errors);

    match &cfg.auth_server {
        AuthServerConfig::Http(http) => validate_http_auth_server(http, &mut errors),
        AuthServerConfig::Simulated(simulated) => validate_simulated_auth_server(simulated, &mut errors),
    }

    if errors.is_empty() {
        info!("config valid");
        Ok(())
    } else {
        error!("configuration validation errors ({}):", errors.len());
        for e in &errors {
            error!(" - {}", e);
        }
        get_metrics().config_validation_errors.inc();
        Err(errors)
    }
}

/// SETTINGS VALIDATION
fn validate_settings(settings: &SettingsConfig, errors: &mut Vec<String>) {
    if let Some(retry) = &settings.initial_fetch_retry {
        validate_retry("settings.initial_fetch_retry", retry, errors);
    }

    if let Some(s) = settings.refresh_ahead_seconds {
        if s > MAX_REFRESH_AHEAD_SECS {
            errors.push(format!(
                "settings.refresh_ahead_seconds ({}) is unreasonably large",
                s
            ));
        }
    }

    let backup = &settings.backup;
    if backup.path.trim().is_empty() {
        errors.push("settings.backup.path cannot be empty".to_string());
    }
    if backup.interval_seconds == 0 {
        errors.push("settings.backup.interval_seconds must be > 0".to_string());
    }
    check_upper_bound("settings.backup.interval_seconds", backup.interval_seconds, MAX_JOB_INTERVAL_SECS, errors);
    if backup.max_age_hours == 0 {
        errors.push("settings.backup.max_age_hours must be > 0".to_string());
    }
    check_upper_bound("settings.backup.max_age_hours", backup.max_age_hours, MAX_BACKUP_MAX_AGE_HOURS, errors);

    let cleanup = &settings.cleanup;
    if cleanup.interval_seconds == 0 {
        errors.push("settings.cleanup.interval_seconds must be > 0".to_string());
    }
    check_upper_bound("settings.cleanup.interval_seconds", cleanup.interval_seconds, MAX_JOB_INTERVAL_SECS, errors);
    if cleanup.inactivity_threshold_seconds == 0 {
        errors.push("settings.cleanup.inactivity_threshold_seconds must be > 0".to_string());
    }
    check_upper_bound(
        "settings.cleanup.inactivity_threshold_seconds",
        cleanup.inactivity_threshold_seconds,
        MAX_INACTIVITY_THRESHOLD_SECS,
        errors,
    );

    if settings.server.host.is_empty() {
        errors.push(format!(
            "settings.server.host '{}' must be valid",
            settings.server.host
        ));
    }
    if settings.server.port.parse::<u16>().is_err() {
        errors.push(format!(
            "settings.server.port '{}' must be an integer in range 0-65535",
            settings.server.port
        ));
    }

    // metrics endpoint start with '/'
    let metrics = &settings.metrics;
    if !metrics.path.starts_with('/') {
        errors.push(format!(
            "settings.metrics.path '{}' must start with '/'",
            metrics.path
        ));
    }

    if let Some(logging) = &settings.logging {
        let valid = ["trace", "debug", "info", "warn", "error"];
        if !valid.contains(&logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "settings.logging.level '{}' invalid; allowed: {:?}",
                logging.level, valid
            ));
        }
    }
}

fn check_upper_bound(path: &str, value: u64, max: u64, errors: &mut Vec<String>) {
    if value > max {
        errors.push(format!("{} ({}) is unreasonably large; max {}", path, value, max));
    }
}

fn validate_retry(path: &str, retry: &RetryConfig, errors: &mut Vec<String>) {
    if retry.base_delay_ms == Some(0) {
        errors.push(format!("{}.base_delay_ms must be > 0", path));
    }
    if let (Some(base), Some(max)) = (retry.base_delay_ms, retry.max_delay_ms) {
        if max < base {
            errors.push(format!(
                "{}.max_delay_ms ({}) must be >= base_delay_ms ({})",
                path, max, base
            ));
        }
    }
}

/// AUTH SERVER
fn validate_http_auth_server(cfg: &HttpAuthServerConfig, errors: &mut Vec<String>) {
    validate_request("auth_server.fetch", &cfg.fetch, errors);
    validate_request("auth_server.refresh", &cfg.refresh, errors);

    if !cfg.parse.token_pointer.starts_with('/') {
        errors.push(format!(
            "auth_server.parse.token_pointer '{}' must be a JSON pointer starting with '/'",
            cfg.parse.token_pointer
        ));
    }
    if let Some(pointer) = &cfg.parse.success_pointer {
        if !pointer.starts_with('/') {
            errors.push(format!(
                "auth_server.parse.success_pointer '{}' must be a JSON pointer starting with '/'",
                pointer
            ));
        }
    }
    validate_expiration(&cfg.parse.expiration, errors);

    for status in &cfg.refusal_statuses {
        if !(400..=599).contains(status) {
            errors.push(format!(
                "auth_server.refusal_statuses: {} is not an error status (400-599)",
                status
            ));
        }
    }
    if cfg.timeout_ms == Some(0) {
        errors.push("auth_server.timeout_ms must be > 0 when set".to_string());
    }
}

fn validate_request(path: &str, req: &RequestConfig, errors: &mut Vec<String>) {
    if req.url.trim().is_empty() {
        errors.push(format!("{}.url cannot be empty", path));
    } else if !(req.url.starts_with("http://") || req.url.starts_with("https://")) {
        errors.push(format!("{}.url '{}' must start with http:// or https://", path, req.url));
    }

    if req.method != Method::GET && req.method != Method::POST {
        errors.push(format!(
            "{}.method '{}' must be 'GET' or 'POST'",
            path, req.method
        ));
    }

    if let Some(headers) = &req.headers {
        for (k, v) in headers {
            validate_generic_source_value(&format!("{}.headers.{}", path, k), v, errors);
        }
    }
}

fn validate_generic_source_value(path: &str, v: &GenericSourceValue, errors: &mut Vec<String>) {
    match v {
        GenericSourceValue::Literal { value } => {
            if value.trim().is_empty() {
                errors.push(format!("{}: literal value cannot be empty", path));
            }
        }
        GenericSourceValue::FromEnv { from_env } => {
            if from_env.trim().is_empty() {
                errors.push(format!("{}: env name cannot be empty", path));
            }
        }
        GenericSourceValue::FromFile { path: p } => {
            if p.trim().is_empty() {
                errors.push(format!("{}: from_file path cannot be empty", path));
            }
        }
    }
}

fn validate_expiration(exp: &Expiration, errors: &mut Vec<String>) {
    match exp.source {
        ExpirationSource::Jwt => {}
        ExpirationSource::BodyField | ExpirationSource::HeaderField => match &exp.pointer {
            None => errors.push(
                "auth_server.parse.expiration.pointer is required for body_field/header_field".to_string(),
            ),
            Some(p) if exp.source == ExpirationSource::BodyField && !p.starts_with('/') => {
                errors.push(format!(
                    "auth_server.parse.expiration.pointer '{}' must be a JSON pointer starting with '/'",
                    p
                ))
            }
            Some(p) if p.trim().is_empty() => {
                errors.push("auth_server.parse.expiration.pointer cannot be empty".to_string())
            }
            Some(_) => {}
        },
        ExpirationSource::Manual => match exp.manual_ttl_seconds {
            None | Some(0) => errors.push(
                "auth_server.parse.expiration.manual_ttl_seconds must be > 0 for source=manual".to_string(),
            ),
            Some(ttl) => check_upper_bound(
                "auth_server.parse.expiration.manual_ttl_seconds",
                ttl,
                MAX_TOKEN_TTL_SECS,
                errors,
            ),
        },
    }
}

fn validate_simulated_auth_server(cfg: &SimulatedAuthServerConfig, errors: &mut Vec<String>) {
    if !(0.0..=1.0).contains(&cfg.refresh_success_ratio) {
        errors.push(format!(
            "auth_server.refresh_success_ratio ({}) must be within [0, 1]",
            cfg.refresh_success_ratio
        ));
    }
    if cfg.ttl_seconds == 0 {
        errors.push("auth_server.ttl_seconds must be > 0".to_string());
    }
    check_upper_bound("auth_server.ttl_seconds", cfg.ttl_seconds, MAX_TOKEN_TTL_SECS, errors);
}
