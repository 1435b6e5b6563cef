// Email open-tracking pixel service
//
// Serves a 1x1 transparent GIF at /open?cid=<id> and, without holding up the
// response, records the open against a row of a tracking spreadsheet.
//
// Features:
// - Axum HTTP server (HTTP/1.1, HTTP/2)
// - Spreadsheet tracking log via a service account
// - Structured logging with tracing
// - Graceful shutdown

use anyhow::{Context, Result};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub mod codec;
pub mod config;
pub mod error;
mod handlers;
mod init;
pub mod link;
pub mod matcher;
pub mod row;
pub mod sheets;
pub mod stats;
pub mod tracker;

pub use codec::{decode_identifier, TrackingIdentifier};
pub use config::{LogFormat, RuntimeConfig, ServerConfig, SheetsConfig, TrackingConfig};
pub use error::TrackerError;
pub use handlers::TRANSPARENT_GIF;
pub use init::{init_tracing, init_tracker};
pub use tracker::{OpenOutcome, Tracker, TrackingStore};

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RuntimeConfig>,
    /// `None` when the tracking log is not configured; pixels are still served
    pub tracker: Option<Arc<Tracker>>,
}

impl AppState {
    pub fn new(config: RuntimeConfig, tracker: Option<Arc<Tracker>>) -> Self {
        Self {
            config: Arc::new(config),
            tracker,
        }
    }
}

/// Error type that implements IntoResponse
pub(crate) struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        warn!("Request error: {:?}", self.error);
        (
            self.status,
            Json(json!({
                "error": self.error.to_string(),
            })),
        )
            .into_response()
    }
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }
}

/// Build the HTTP router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/open", get(handlers::handle_open))
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::status_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

/// Entry point for server mode with a resolved configuration
pub async fn run_with_config(config: RuntimeConfig) -> Result<()> {
    init_tracing(&config.server);

    let addr = config.server.listen_addr.clone();
    let tracker = init_tracker(&config);
    let state = AppState::new(config, tracker);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Tracking pixel endpoint listening on http://{}", addr);
    info!("Routes:");
    info!("  GET http://{}/open?cid=..  - Tracking pixel", addr);
    info!("  GET http://{}/health       - Health check", addr);
    info!("  GET http://{}/status       - Configuration status", addr);
    info!("Press Ctrl+C or send SIGTERM to stop");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");

    Ok(())
}
