//! Vitals Server - HTTP surface for the health-check orchestrator.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use vitals_core::bootstrap;
use vitals_core::config::Config;
use vitals_core::routes::{self, AppState};
use vitals_core::scheduler;
use vitals_core::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: could not load config: {e}. Using defaults.");
        Config::default()
    });

    telemetry::init_logging(&config.observability)?;
    let metrics_handle = telemetry::init_metrics()?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting vitals server");

    let orchestrator = bootstrap::build_orchestrator(&config).await?;

    let scheduler_handle = if config.health.schedule.enabled {
        Some(scheduler::spawn(
            orchestrator.clone(),
            config.health.schedule.interval,
        ))
    } else {
        None
    };

    let state = AppState::new(orchestrator, config.health.ping_check_critical);
    let app = Router::new()
        .merge(routes::router(state))
        .route(
            "/metrics",
            get(move || {
                let handle = metrics_handle.clone();
                async move { handle.render() }
            }),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = scheduler_handle {
        handle.stop().await;
    }
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
