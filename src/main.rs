// src/main.rs
use anyhow::Result;
use health_aggregator::{
    config,
    server::{ServerBuilder, StatusHandler},
};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("health_aggregator=debug".parse()?)
                .add_directive("healthd=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;

    let checker = Arc::new(config.build_checker()?);
    info!("Registered {} checkers", checker.len());

    if let Some(interval) = config.refresh_interval() {
        checker.start(interval).await;
    }

    let handler = StatusHandler::new(checker.clone(), config.path.as_str());

    info!("Serving health on http://{}{}", config.listen, config.path);
    ServerBuilder::new(config.listen)
        .with_handler(handler)
        .serve_until(shutdown_signal())
        .await?;

    checker.stop().await;
    Ok(())
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
