use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};
use tracing::info;
use std::sync::{Arc, OnceLock};


// Declare the static OnceLock to hold the Metrics.
static METRICS_INSTANCE: OnceLock<Arc<Metrics>> = OnceLock::new();

/// Initializes on first use and gets a reference to the static `Metrics`.
/// Sync: called from inside record critical sections.
pub fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE.get_or_init(|| {
        info!("Initializing Metrics ...");
        Metrics::new()
    })
}


#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Auth server metrics
    pub token_fetch_requests: IntCounterVec,
    pub token_fetch_failures: IntCounterVec,
    pub token_fetch_duration: HistogramVec,

    // Coordination metrics
    pub refresh_joins: IntCounterVec,
    pub token_types: IntGauge,
    pub token_expiry_unix: IntGaugeVec,
    pub callback_failures: IntCounter,

    // Visitor metrics
    pub active_visitors: IntGauge,
    pub evicted_visitors: IntCounter,

    // Backup metrics
    pub backup_writes: IntCounter,
    pub backup_skipped: IntCounter,
    pub backup_failures: IntCounterVec,
    pub backup_duration: HistogramVec,
    pub restored_tokens: IntCounter,

    // Config/runtime
    pub parse_failures: IntCounter,
    pub config_validation_errors: IntCounter,
    pub up: IntGauge,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("sharedtoken".into()), None).unwrap();

        let metrics: Arc<Metrics> = Arc::new(Self {
            // Auth server
            token_fetch_requests: IntCounterVec::new(Opts::new("token_fetch_requests_total","Total calls to the auth server by token type",),&["token_type", "operation"],).unwrap(),
            token_fetch_failures: IntCounterVec::new(Opts::new("token_fetch_failures_total", "Auth server failures by reason"),&["token_type", "operation", "reason"],).unwrap(),
            token_fetch_duration: HistogramVec::new(HistogramOpts::new("token_fetch_duration_seconds", "Auth server call duration seconds").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),&["token_type", "operation"],).unwrap(),

            // Coordination
            refresh_joins: IntCounterVec::new(Opts::new("token_refresh_joins_total", "Refresh requests joined to an in-flight operation"),&["token_type"],).unwrap(),
            token_types: IntGauge::new("token_types", "Token types held by the store").unwrap(),
            token_expiry_unix: IntGaugeVec::new(Opts::new("token_expiry_unix_seconds", "Token expiry timestamp"),&["token_type"],).unwrap(),
            callback_failures: IntCounter::new("refresh_callback_failures_total", "Refresh callbacks that panicked").unwrap(),

            // Visitors
            active_visitors: IntGauge::new("active_visitors", "Visitors currently tracked by the ledger").unwrap(),
            evicted_visitors: IntCounter::new("evicted_visitors_total", "Visitors removed by the inactivity sweep").unwrap(),

            // Backup
            backup_writes: IntCounter::new("backup_writes_total", "Snapshots written to durable storage").unwrap(),
            backup_skipped: IntCounter::new("backup_skipped_total", "Snapshot requests dropped while another snapshot was running").unwrap(),
            backup_failures: IntCounterVec::new(Opts::new("backup_failures_total", "Backup failures"),&["operation"],).unwrap(),
            backup_duration: HistogramVec::new(HistogramOpts::new("backup_duration_seconds", "Snapshot / restore time").buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),&["operation"],).unwrap(),
            restored_tokens: IntCounter::new("restored_tokens_total", "Tokens merged from a backup at startup").unwrap(),

            // Config/runtime
            parse_failures: IntCounter::new("config_parse_failures_total","Config parse failures",).unwrap(),
            config_validation_errors: IntCounter::new("config_validation_errors_total","Validation errors during startup",).unwrap(),
            up: IntGauge::new("up", "1 if service is healthy").unwrap(),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.token_fetch_requests.clone())).unwrap();
        reg.register(Box::new(metrics.token_fetch_failures.clone())).unwrap();
        reg.register(Box::new(metrics.token_fetch_duration.clone())).unwrap();
        reg.register(Box::new(metrics.refresh_joins.clone())).unwrap();
        reg.register(Box::new(metrics.token_types.clone())).unwrap();
        reg.register(Box::new(metrics.token_expiry_unix.clone())).unwrap();
        reg.register(Box::new(metrics.callback_failures.clone())).unwrap();
        reg.register(Box::new(metrics.active_visitors.clone())).unwrap();
        reg.register(Box::new(metrics.evicted_visitors.clone())).unwrap();
        reg.register(Box::new(metrics.backup_writes.clone())).unwrap();
        reg.register(Box::new(metrics.backup_skipped.clone())).unwrap();
        reg.register(Box::new(metrics.backup_failures.clone())).unwrap();
        reg.register(Box::new(metrics.backup_duration.clone())).unwrap();
        reg.register(Box::new(metrics.restored_tokens.clone())).unwrap();
        reg.register(Box::new(metrics.parse_failures.clone())).unwrap();
        reg.register(Box::new(metrics.config_validation_errors.clone())).unwrap();
        reg.register(Box::new(metrics.up.clone())).unwrap();

        metrics
    }
}
