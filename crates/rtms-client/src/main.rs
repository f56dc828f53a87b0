//! RTMS Client
//!
//! Receives control-plane webhooks and joins the announced media streaming
//! sessions over paired signaling and media WebSocket channels.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment (and `.env`, if present)
//! 2. Initialize Prometheus metrics recorder
//! 3. Spawn the session registry and controller
//! 4. Bind the HTTP server (webhook, health, metrics) and mark ready
//! 5. Wait for shutdown signal
//!
//! # Shutdown Flow
//!
//! 1. Mark not ready
//! 2. Refuse new sessions, close every session and wait for its channels
//! 3. Stop the HTTP server

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;

use rtms_client::config::Config;
use rtms_client::controller::SessionController;
use rtms_client::observability::metrics::init_metrics_recorder;
use rtms_client::observability::HealthState;
use rtms_client::routes::{self, AppState};
use rtms_client::session::{ClientContext, Credentials};
use rtms_client::sink::LoggingFrameSink;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rtms_client=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting RTMS Client");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!(
        client_id = %config.client_id,
        port = config.port,
        webhook_path = %config.webhook_path,
        event_subscriptions = ?config.event_subscriptions,
        channel_close_timeout_ms = config.channel_close_timeout.as_millis(),
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    let health_state = Arc::new(HealthState::new());

    let context = Arc::new(
        ClientContext::new(
            Credentials::new(config.client_id.clone(), config.client_secret.clone()),
            Arc::new(LoggingFrameSink),
        )
        .with_event_subscriptions(config.event_subscriptions.clone()),
    );

    let root_token = CancellationToken::new();
    let (controller, registry_task) = SessionController::spawn(
        context,
        config.channel_close_timeout,
        root_token.child_token(),
    );
    info!("Session registry started");

    let state = Arc::new(AppState {
        controller: controller.clone(),
        webhook_secret: config.webhook_secret_token.clone(),
    });

    let app = routes::build_routes(
        state,
        &config.webhook_path,
        Arc::clone(&health_state),
        prometheus_handle,
    );

    let addr: SocketAddr = config.bind_address().parse().map_err(|e| {
        error!(error = %e, "Invalid bind address");
        e
    })?;

    // Bind before marking ready to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(error = %e, addr = %addr, "Failed to bind HTTP server");
        e
    })?;

    let server_token = root_token.child_token();
    let server_shutdown = server_token.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                server_shutdown.cancelled().await;
                info!("HTTP server shutting down");
            })
            .await
    });

    health_state.set_ready();
    info!(addr = %addr, "RTMS Client listening");

    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Fail readiness, then refuse new session starts while closing sessions
    health_state.set_not_ready();

    controller.shutdown().await;
    if let Err(e) = registry_task.await {
        error!(error = %e, "Session registry task failed");
    }

    root_token.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
        Err(e) => error!(error = %e, "HTTP server task failed"),
    }

    info!("RTMS Client shutdown complete");
    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT"),
            Err(e) => error!(error = %e, "Failed to listen for SIGINT"),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM");
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
