//! HTTP server setup.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{extract::DefaultBodyLimit, Router};
use pkgd_core::{Registry, RegistryConfig};
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::routes::{health, npm, packages};
use crate::state::AppState;

/// Build the router over an opened registry.
pub fn create_app(state: Arc<AppState>) -> Router {
    let body_limit = usize::try_from(state.registry.config().max_upload_size).unwrap_or(usize::MAX);

    Router::new()
        .merge(health::routes())
        .merge(packages::routes())
        .merge(npm::routes())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the registry, reload stored packages and serve until interrupted.
pub async fn run_server(host: &str, port: u16, config: RegistryConfig) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse().map_err(|e| {
        error!(host = %host, port = %port, error = %e, "Invalid socket address");
        anyhow::anyhow!("Invalid socket address {}:{}: {}", host, port, e)
    })?;

    let registry = Registry::open(config).await?;
    let report = registry.reload_all().await?;
    if !report.failed.is_empty() {
        warn!(
            failed = report.failed.len(),
            "Some stored packages could not be loaded"
        );
    }
    info!(
        packages = registry.index().package_count(),
        versions = report.loaded,
        "Stored packages loaded"
    );

    let registry_url = registry.config().registry_url().to_string();
    let state = AppState::new(registry, addr.to_string());
    let app = create_app(state);

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        error!(addr = %addr, error = %e, "Failed to bind to address");
        anyhow::anyhow!("Failed to bind to {}: {}", addr, e)
    })?;

    println!("pkgd listening on http://{addr}");
    println!("npm registry URL:\n  {registry_url}\n");
    info!(addr = %addr, registry_url = %registry_url, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = %e, "Server error");
            anyhow::anyhow!("Server error: {}", e)
        })?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
