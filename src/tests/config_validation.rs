#[cfg(test)]
mod test {
    use crate::config::proc_loader::parse_config;
    use crate::config::settings::SettingsConfig;
    use crate::config::sources::{AuthServerConfig, ExpirationSource};
    use crate::registry::RegistrySettings;
    use crate::utils::constants::{DEFAULT_REFRESH_AHEAD_SECS, DEFAULT_REFUSAL_STATUSES};

    const HTTP_CONFIG: &str = r#"
settings:
  refresh_ahead_seconds: 45
  initial_fetch_retry:
    base_delay_ms: 500
    max_delay_ms: 8000
  backup:
    path: /tmp/shared-token-agent/backup.json
    interval_seconds: 120
    max_age_hours: 12
  cleanup:
    interval_seconds: 300
    inactivity_threshold_seconds: 900
  metrics:
    path: /metrics
    is_enabled: true
  logging:
    level: debug
    format: json
auth_server:
  type: http
  fetch:
    url: https://auth.example.com/anonymous
    method: POST
    headers:
      x-api-key:
        value: secret
  refresh:
    url: https://auth.example.com/refresh
    headers:
      authorization:
        from_env: AUTH_REFRESH_KEY
  parse:
    token_pointer: /data/token
    success_pointer: /success
    expiration:
      source: body_field
      pointer: /data/expires_in
  timeout_ms: 3000
"#;

    #[tokio::test]
    async fn accepts_http_auth_server() {
        let cfg = parse_config(HTTP_CONFIG.to_string()).await.unwrap();
        let AuthServerConfig::Http(http) = &cfg.auth_server else {
            panic!("expected http auth server");
        };
        assert_eq!(http.refresh.method, http::Method::POST);
        assert_eq!(http.parse.expiration.source, ExpirationSource::BodyField);
        assert_eq!(http.refusal_statuses, DEFAULT_REFUSAL_STATUSES.to_vec());

        let settings = RegistrySettings::from(&cfg.settings);
        assert_eq!(settings.refresh_ahead.num_seconds(), 45);
        assert_eq!(settings.backup_path.to_str(), Some("/tmp/shared-token-agent/backup.json"));
        assert_eq!(settings.backup_interval.as_secs(), 120);
        assert_eq!(settings.inactivity_threshold.as_secs(), 900);
        assert_eq!(settings.initial_fetch_retry.base_delay_ms, 500);
    }

    #[tokio::test]
    async fn simulated_server_gets_defaults() {
        let cfg = parse_config("auth_server:\n  type: simulated\n".to_string()).await.unwrap();
        assert!(matches!(cfg.auth_server, AuthServerConfig::Simulated(_)));
        assert_eq!(cfg.settings.refresh_ahead_seconds, Some(DEFAULT_REFRESH_AHEAD_SECS));
        assert_eq!(cfg.settings.logging.unwrap().level, "info");
        assert!(!cfg.settings.metrics.is_enabled);
    }

    #[tokio::test]
    async fn reports_every_problem_at_once() {
        let yaml = r#"
settings:
  initial_fetch_retry:
    base_delay_ms: 1000
    max_delay_ms: 10
  backup:
    interval_seconds: 0
  metrics:
    path: metrics
auth_server:
  type: http
  fetch:
    url: ftp://auth.example.com
    method: DELETE
  refresh:
    url: ""
  parse:
    token_pointer: data.token
    expiration:
      source: manual
  refusal_statuses: [200]
"#;
        let err = parse_config(yaml.to_string()).await.unwrap_err().to_string();
        for expected in [
            "max_delay_ms (10) must be >= base_delay_ms (1000)",
            "backup.interval_seconds must be > 0",
            "metrics.path 'metrics'",
            "auth_server.fetch.url",
            "auth_server.fetch.method",
            "auth_server.refresh.url cannot be empty",
            "token_pointer 'data.token'",
            "manual_ttl_seconds must be > 0",
            "200 is not an error status",
        ] {
            assert!(err.contains(expected), "missing '{}' in:\n{}", expected, err);
        }
        assert!(err.contains("total errors:9"));
    }

    #[tokio::test]
    async fn simulated_ratio_out_of_range_is_rejected() {
        let yaml = "auth_server:\n  type: simulated\n  refresh_success_ratio: 1.5\n";
        let err = parse_config(yaml.to_string()).await.unwrap_err().to_string();
        assert!(err.contains("refresh_success_ratio"));
    }

    #[tokio::test]
    async fn oversized_durations_are_rejected() {
        let yaml = r#"
settings:
  refresh_ahead_seconds: 18446744073709551615
  backup:
    interval_seconds: 18446744073709551615
    max_age_hours: 18446744073709551615
  cleanup:
    interval_seconds: 18446744073709551615
    inactivity_threshold_seconds: 18446744073709551615
auth_server:
  type: simulated
  ttl_seconds: 18446744073709551615
"#;
        let err = parse_config(yaml.to_string()).await.unwrap_err().to_string();
        for expected in [
            "settings.refresh_ahead_seconds",
            "settings.backup.interval_seconds",
            "settings.backup.max_age_hours",
            "settings.cleanup.interval_seconds",
            "settings.cleanup.inactivity_threshold_seconds",
            "auth_server.ttl_seconds",
        ] {
            assert!(err.contains(expected), "missing '{}' in:\n{}", expected, err);
        }
        assert!(err.contains("total errors:6"));

        let manual = HTTP_CONFIG.replace(
            "      source: body_field\n      pointer: /data/expires_in",
            "      source: manual\n      manual_ttl_seconds: 18446744073709551615",
        );
        let err = parse_config(manual).await.unwrap_err().to_string();
        assert!(err.contains("manual_ttl_seconds"), "{}", err);
    }

    #[test]
    fn huge_max_age_saturates_instead_of_overflowing() {
        let mut cfg = SettingsConfig::default();
        cfg.backup.max_age_hours = u64::MAX;
        cfg.backup.interval_seconds = u64::MAX;
        let settings = RegistrySettings::from(&cfg);
        assert!(settings.backup_max_age > chrono::Duration::days(365 * 1000));
        assert_eq!(settings.backup_interval.as_secs(), u64::MAX);
    }

    #[tokio::test]
    async fn malformed_yaml_is_an_error() {
        assert!(parse_config("auth_server: [".to_string()).await.is_err());
        assert!(parse_config("settings: {}\n".to_string()).await.is_err());
    }
}
