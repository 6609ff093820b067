use std::net::{SocketAddr, TcpListener};

use clap::Parser;
use flick_server::config::ServerConfig;
use flick_server::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,flick_server=debug")),
        )
        .init();

    let config = ServerConfig::parse();
    config.validate()?;
    let state = AppState::open(&config)?;

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr)?;
    tracing::info!(%addr, window_secs = config.window_secs, "listening");
    flick_server::run(listener, state, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = ?err, "failed to listen for shutdown signal");
        futures::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
