//! SageRelay Server - Main entry point

use anyhow::Result;
use axum::{routing::get, Json, Router};
use sagerelay_common::logging::{init_logging, LogConfig};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::info;

use sagerelay_server::{
    config::Config,
    notify::EmailNotifier,
    oauth::{routes::oauth_routes, CredentialExchange},
    training::{routes::training_routes, JobOrchestrator},
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::from_env()
        .unwrap_or_default()
        .with_file_prefix("sagerelay-server")
        .with_filter_directives("sagerelay_server=debug,tower_http=debug,axum=trace");

    init_logging(&log_config)?;

    info!("Starting SageRelay Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let notifier = Arc::new(EmailNotifier::new(&config.smtp)?);
    info!("SMTP transport initialized");

    let orchestrator = Arc::new(JobOrchestrator::new(&config, notifier));
    let exchange = Arc::new(CredentialExchange::new(&config.oauth)?);

    let app = create_router(orchestrator, exchange);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_grace()))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Create the application router with all routes and middleware
fn create_router(orchestrator: Arc<JobOrchestrator>, exchange: Arc<CredentialExchange>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/actions/train", training_routes().with_state(orchestrator))
        .nest("/oauth", oauth_routes().with_state(exchange))
        // Apply layers from innermost to outermost
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// Health check handler
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

/// Graceful shutdown signal handler
async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Give in-flight uploads time to finish or abort
    info!("Waiting up to {} seconds for connections to close", grace.as_secs());
    tokio::time::sleep(grace).await;
}
