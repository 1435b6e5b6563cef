//! Error types for the open-tracking pipeline.
//!
//! Every variant is terminal for the background task that produced it; the
//! HTTP layer never surfaces these to the email client.

use thiserror::Error;

/// Errors raised while decoding, matching, or persisting an open event.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Credentials or document id were not configured
    #[error("Tracking log not configured: {0}")]
    ConfigMissing(String),

    /// The CID was not valid URL-safe base64 or not UTF-8
    #[error("Failed to decode tracking identifier: {0}")]
    Decode(String),

    /// Service-account credentials were rejected or unusable
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The remote store could not be reached
    #[error("Failed to reach tracking log: {0}")]
    Connect(String),

    /// The remote store answered with a non-success status
    #[error("Tracking log API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Neither exact nor case-insensitive title lookup found the sheet
    #[error("Sheet '{0}' not found in tracking document")]
    SheetNotFound(String),

    /// The header row lacks columns the tracker writes to
    #[error("Sheet is missing required columns: {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    /// No row matched the identifier, even after the optional insert
    #[error("No tracking row found for CID '{0}'")]
    NotFound(String),

    /// The remote store returned a body we could not interpret
    #[error("Unexpected tracking log response: {0}")]
    Json(String),
}

impl TrackerError {
    /// Whether another attempt at the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connect(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether a document load should try again. Rejected credentials count
    /// too, since a token can expire or be revoked between calls.
    pub fn retries_on_load(&self) -> bool {
        self.is_retryable() || matches!(self, Self::Auth(_))
    }

    /// Short stable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigMissing(_) => "config_missing",
            Self::Decode(_) => "decode",
            Self::Auth(_) => "auth",
            Self::Connect(_) => "connect",
            Self::Api { .. } => "api",
            Self::SheetNotFound(_) => "sheet_not_found",
            Self::Schema { .. } => "schema",
            Self::NotFound(_) => "not_found",
            Self::Json(_) => "json",
        }
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Json(err.to_string())
        } else {
            Self::Connect(err.to_string())
        }
    }
}

/// Result type alias for TrackerError
pub type Result<T> = std::result::Result<T, TrackerError>;
