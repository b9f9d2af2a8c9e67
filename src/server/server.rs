use anyhow::Result;
use axum::Router;
use tracing::info;

use crate::config::settings::SettingsConfig;
use crate::observability::metrics::{get_metrics, Metrics};
use crate::observability::routes::MetricsState;
use crate::registry::TokenRegistry;
use crate::server::token_routes;

#[derive(Clone)]
pub struct AppState {
    pub metrics_state: MetricsState,
    pub registry: TokenRegistry,
}

impl AppState {
    pub fn new(metrics: &Metrics, registry: TokenRegistry) -> Self {
        Self {
            metrics_state: MetricsState::new(metrics.registry.clone()),
            registry,
        }
    }
}

/// Full HTTP surface: token routes plus the metrics route when enabled.
pub fn app(settings_config: &SettingsConfig, registry: TokenRegistry) -> Router {
    let state = AppState::new(get_metrics(), registry);
    Router::new()
        .merge(token_routes::router())
        .merge(state.metrics_state.router(&settings_config.metrics))
        .with_state(state)
}

/// Serves until the registry is shut down.
pub async fn start(settings_config: &SettingsConfig, registry: TokenRegistry) -> Result<()> {
    let shutdown = registry.cancellation();
    let app = app(settings_config, registry);

    let bind_addr = &settings_config.server.host;
    let port = &settings_config.server.port;
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind_addr, port)).await?;
    info!(address = %bind_addr, port = %port, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("http server stopped");
    Ok(())
}
