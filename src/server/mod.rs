//! Server module
//!
//! Hosts the HTTP adapter on axum.

pub mod http;

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::ServerConfig;

pub use http::{build_router, status_for, AppState};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid bind address {0}")]
    InvalidAddress(String),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bind and serve until Ctrl-C.
pub async fn run_server(config: &ServerConfig, state: AppState) -> Result<(), ServerError> {
    let raw = format!("{}:{}", config.bind, config.port);
    let addr: SocketAddr = raw
        .parse()
        .map_err(|_| ServerError::InvalidAddress(raw.clone()))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "moderation relay listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
