// Configuration validation
//
// Rejects structurally invalid values. Missing credentials or document id are
// not errors here: the service still serves pixels and reports them on /status.

use super::*;
use anyhow::{bail, Result};
use tracing::warn;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_server_config(&config.server)?;
    validate_sheets_config(&config.sheets)?;
    validate_tracking_config(&config.tracking)?;
    Ok(())
}

fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.listen_addr.is_empty() {
        bail!("server.listen_addr must not be empty");
    }

    // Basic validation that it looks like an address
    if !config.listen_addr.contains(':') {
        bail!("server.listen_addr must be in format 'host:port'");
    }

    Ok(())
}

fn validate_sheets_config(config: &SheetsConfig) -> Result<()> {
    if config.sheet_name.trim().is_empty() {
        bail!(
            "sheets.sheet_name must not be empty\n\n\
            How to fix:\n\
              • Environment: export {}SHEET_NAME=\"{}\"\n\
              • TOML: [sheets]\n              sheet_name = \"{}\"\n",
            ENV_PREFIX,
            DEFAULT_SHEET_NAME,
            DEFAULT_SHEET_NAME
        );
    }

    if !(config.api_base.starts_with("http://") || config.api_base.starts_with("https://")) {
        bail!(
            "sheets.api_base must be an http(s) URL, got '{}'",
            config.api_base
        );
    }

    if config.request_timeout_secs == 0 {
        bail!("sheets.request_timeout_secs must be greater than 0");
    }

    Ok(())
}

fn validate_tracking_config(config: &TrackingConfig) -> Result<()> {
    if config.load_attempts == 0 {
        bail!("tracking.load_attempts must be greater than 0");
    }

    if config.dedup_window_ms == 0 {
        warn!("tracking.dedup_window_ms is 0; every pixel fetch will count as an open");
    }

    if config.retry_delay_ms > 60_000 {
        warn!(
            retry_delay_ms = config.retry_delay_ms,
            "tracking.retry_delay_ms is very large; background updates may pile up"
        );
    }

    Ok(())
}
