mod config;
mod dto;
mod error;
mod routes;
mod state;

use std::sync::Arc;

use servernet::hetzner::HetznerCloud;
use servernet::{ServerNetworks, Settings};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::routes::api_router;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    // Cloud client + convergence tuning
    let cloud = HetznerCloud::from_env().expect("failed to configure Hetzner Cloud client");
    let settings = Settings::from_env().expect("invalid server network settings");
    tracing::info!(
        max_attempts = settings.retry.max_attempts,
        action_timeout = ?settings.action_wait.timeout,
        "server network convergence ready"
    );

    let shutdown = CancellationToken::new();
    let state = AppState {
        networks: ServerNetworks::new(Arc::new(cloud), settings),
        shutdown: shutdown.clone(),
    };

    let app = api_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .expect("failed to bind listener");

    tracing::info!(addr = %config.listen_addr, "starting server network API");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .expect("server error");
}

/// Resolve on Ctrl-C, cancelling in-flight action waits.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
    shutdown.cancel();
}
