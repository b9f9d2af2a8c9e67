use anyhow::Result;
use clap::Parser;
use shared_token_agent::registry::{RegistrySettings, TokenRegistry};
use shared_token_agent::server;
use shared_token_agent::sources::build_auth_server;
use shared_token_agent::utils::config_loader;
use shared_token_agent::utils::logging;
use shared_token_agent::utils::logging::LogLevel;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "shared-token-agent.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load YAML config, init logging
    // -------------------------------

    let args = Args::parse();
    let service_config = config_loader::run(&args.config).await?;
    logging::run(&service_config, args.log_level);

    // -------------------------------
    // 2. Auth server + registry (restore, periodic backup and cleanup)
    // -------------------------------

    let auth = build_auth_server(&service_config.auth_server)?;
    let registry = TokenRegistry::start(RegistrySettings::from(&service_config.settings), auth).await?;

    // -------------------------------
    // 3. Start http server
    // -------------------------------

    let settings = service_config.settings.clone();
    let server_registry = registry.clone();
    let mut http_server = tokio::spawn(async move { server::server::start(&settings, server_registry).await });
    info!("Service starting...");

    // -------------------------------
    // 4. Wait for a stop signal (or a dead server), flush and drain
    // -------------------------------

    let server_result = tokio::select! {
        _ = shutdown_signal() => None,
        result = &mut http_server => Some(result),
    };
    registry.shutdown().await;

    let server_result = match server_result {
        Some(result) => result,
        None => http_server.await,
    };
    match server_result {
        Ok(Err(e)) => error!(error = ?e, "http server failed"),
        Err(e) => error!(error = ?e, "http server task panicked"),
        Ok(Ok(())) => {}
    }
    info!("Service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received"),
        _ = terminate => info!("SIGTERM received"),
    }
}
