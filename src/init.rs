// Initialization utilities for server mode
//
// Tracking log connection and logging/tracing setup

use crate::config::{LogFormat, RuntimeConfig, ServerConfig};
use crate::error::TrackerError;
use crate::sheets::SheetsClient;
use crate::tracker::Tracker;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Connect the tracker to the configured spreadsheet.
///
/// Returns `None` when the tracking log is not configured or the credentials
/// cannot be used; the server still answers pixel requests in that case.
pub fn init_tracker(config: &RuntimeConfig) -> Option<Arc<Tracker>> {
    match SheetsClient::connect(&config.sheets, &config.tracking) {
        Ok(client) => {
            info!(
                document_id = %client.document_id(),
                sheet = %config.sheets.sheet_name,
                client_email = %client.client_email(),
                "Tracking log configured"
            );
            Some(Arc::new(Tracker::new(
                Arc::new(client),
                config.tracking.clone(),
            )))
        }
        Err(TrackerError::ConfigMissing(missing)) => {
            warn!(
                missing = %missing,
                "Tracking log not configured; opens will not be recorded"
            );
            None
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize tracking log; opens will not be recorded");
            None
        }
    }
}

/// Initialize tracing/logging from the server config
pub fn init_tracing(server: &ServerConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_new(&server.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Try to set the global subscriber; ignore error if already set (idempotent)
    let _ = match server.log_format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
        }
        LogFormat::Text => tracing::subscriber::set_global_default(registry.with(fmt::layer())),
    };
}
