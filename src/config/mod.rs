// Runtime configuration for the pixel service
//
// Sources, lowest to highest priority:
// 1. Built-in defaults
// 2. Config file from MAILPIXEL_CONFIG, inline TOML from MAILPIXEL_CONFIG_CONTENT,
//    or a default file location (./mailpixel.toml, ./.mailpixel.toml)
// 3. Standard Google variables (GOOGLE_SERVICE_ACCOUNT_JSON, GOOGLE_SHEET_ID, ...)
// 4. MAILPIXEL_* environment variables
// 5. CLI flags (applied by the binary)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};

pub const DEFAULT_SHEET_NAME: &str = "Email Tracking Log";
pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com";

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub sheets: SheetsConfig,

    #[serde(default)]
    pub tracking: TrackingConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Tracking log (spreadsheet) connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    /// Service-account key JSON, inline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_json: Option<String>,

    /// Path to a service-account key JSON file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<String>,

    /// Spreadsheet document id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,

    pub sheet_name: String,
    pub api_base: String,
    pub request_timeout_secs: u64,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            credentials_json: None,
            credentials_path: None,
            document_id: None,
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            api_base: DEFAULT_SHEETS_API_BASE.to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl SheetsConfig {
    /// Names of the required settings that are absent or blank.
    pub fn missing_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        let has_credentials =
            non_blank(&self.credentials_json) || non_blank(&self.credentials_path);
        if !has_credentials {
            missing.push("credentials");
        }
        if !non_blank(&self.document_id) {
            missing.push("document_id");
        }
        missing
    }

    pub fn is_configured(&self) -> bool {
        self.missing_settings().is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn non_blank(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Open-tracking behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Opens of the same row within this many milliseconds count once
    pub dedup_window_ms: u64,
    /// Email substrings whose opens are never recorded
    pub ignored_senders: Vec<String>,
    /// Append a row when no existing row matches
    pub create_missing_rows: bool,
    /// Attempts for loading the document before giving up
    pub load_attempts: u32,
    /// Fixed delay between load attempts
    pub retry_delay_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            dedup_window_ms: 5_000,
            ignored_senders: default_ignored_senders(),
            create_missing_rows: true,
            load_attempts: 3,
            retry_delay_ms: 1_000,
        }
    }
}

fn default_ignored_senders() -> Vec<String> {
    vec![
        "test@example.com".to_string(),
        "noreply@example.com".to_string(),
    ]
}

impl TrackingConfig {
    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Load configuration from a specific file path (for CLI usage).
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Load configuration with graceful fallback to defaults.
    /// Does not fail if a config file is missing or unreadable.
    pub fn load_or_default() -> Result<Self> {
        sources::load_or_default()
    }

    /// Parse a TOML document on top of the defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config content")
    }

    /// Merge another config into this one (used for TOML layering).
    pub fn merge(&mut self, other: RuntimeConfig) {
        self.server = other.server;
        self.tracking = other.tracking;

        // Keep secrets supplied by an earlier layer unless the new one sets them
        let SheetsConfig {
            credentials_json,
            credentials_path,
            document_id,
            sheet_name,
            api_base,
            request_timeout_secs,
        } = other.sheets;
        if credentials_json.is_some() {
            self.sheets.credentials_json = credentials_json;
        }
        if credentials_path.is_some() {
            self.sheets.credentials_path = credentials_path;
        }
        if document_id.is_some() {
            self.sheets.document_id = document_id;
        }
        self.sheets.sheet_name = sheet_name;
        self.sheets.api_base = api_base;
        self.sheets.request_timeout_secs = request_timeout_secs;
    }

    /// Apply environment overrides from a custom source.
    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}
