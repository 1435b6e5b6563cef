//! HTTP client for the spreadsheet values API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::auth::{ServiceAccountAuth, ServiceAccountKey};
use super::document::{row_from_range, Document, Sheet};
use crate::config::{SheetsConfig, TrackingConfig};
use crate::error::{Result, TrackerError};
use crate::row::{required_columns, TrackingRow};
use crate::tracker::TrackingStore;

#[derive(Debug, Deserialize)]
struct SpreadsheetResponse {
    #[serde(rename = "spreadsheetId", default)]
    spreadsheet_id: Option<String>,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct AppendResponse {
    #[serde(default)]
    updates: Option<AppendUpdates>,
}

#[derive(Debug, Deserialize)]
struct AppendUpdates {
    #[serde(rename = "updatedRange", default)]
    updated_range: Option<String>,
}

/// Connection to one tracking document.
pub struct SheetsClient {
    http: reqwest::Client,
    auth: ServiceAccountAuth,
    api_base: String,
    document_id: String,
    sheet_name: String,
    load_attempts: u32,
    retry_delay: Duration,
}

impl SheetsClient {
    /// Authenticate against the document named in `sheets`.
    ///
    /// Fails with `ConfigMissing` when credentials or the document id are
    /// absent, and with `Auth` when the credential blob is unusable. No
    /// network call is made until the document is loaded.
    pub fn connect(sheets: &SheetsConfig, tracking: &TrackingConfig) -> Result<Self> {
        let missing = sheets.missing_settings();
        if !missing.is_empty() {
            return Err(TrackerError::ConfigMissing(missing.join(", ")));
        }

        let key = load_service_account(sheets)?;

        let http = reqwest::Client::builder()
            .timeout(sheets.request_timeout())
            .build()
            .map_err(|e| TrackerError::Connect(format!("failed to build HTTP client: {}", e)))?;

        let auth = ServiceAccountAuth::new(key, http.clone())?;
        let document_id = sheets
            .document_id
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            http,
            auth,
            api_base: sheets.api_base.trim_end_matches('/').to_string(),
            document_id,
            sheet_name: sheets.sheet_name.clone(),
            load_attempts: tracking.load_attempts.max(1),
            retry_delay: tracking.retry_delay(),
        })
    }

    pub fn client_email(&self) -> &str {
        self.auth.client_email()
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Load document metadata, retrying with a fixed delay on failures that
    /// another attempt could clear, rejected credentials included. The last
    /// error is returned once attempts are exhausted.
    pub async fn load_document(&self) -> Result<Document> {
        let mut attempt = 1;
        loop {
            match self.fetch_document().await {
                Ok(document) => {
                    debug!(
                        document_id = %document.id,
                        sheets = document.sheet_titles.len(),
                        attempt,
                        "Loaded tracking document"
                    );
                    return Ok(document);
                }
                Err(e) if e.retries_on_load() && attempt < self.load_attempts => {
                    warn!(
                        document_id = %self.document_id,
                        attempt,
                        max_attempts = self.load_attempts,
                        error = %e,
                        "Document load failed, retrying in {:?}",
                        self.retry_delay
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_document(&self) -> Result<Document> {
        let mut url = self.document_url(&[])?;
        url.query_pairs_mut()
            .append_pair("fields", "spreadsheetId,sheets.properties.title");

        let body: SpreadsheetResponse = self.send(Method::GET, url, None).await?.json().await?;
        Ok(Document {
            id: body.spreadsheet_id.unwrap_or_else(|| self.document_id.clone()),
            sheet_titles: body.sheets.into_iter().map(|s| s.properties.title).collect(),
        })
    }

    /// Fetch every row of the worksheet titled `title`.
    pub async fn load_sheet(&self, title: &str) -> Result<Sheet> {
        let empty = Sheet::new(title, Vec::new());
        let url = self.document_url(&["values", &empty.full_range()])?;

        let body: ValueRange = self.send(Method::GET, url, None).await?.json().await?;
        let values = body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect();
        Ok(Sheet::from_values(title, values))
    }

    /// Append `row` after the last row of `sheet`, returning it with its
    /// assigned row number.
    pub async fn insert_row(&self, sheet: &mut Sheet, row: TrackingRow) -> Result<TrackingRow> {
        let range = format!("{}:append", sheet.full_range());
        let mut url = self.document_url(&["values", &range])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let payload = json!({ "values": [row.to_cells(&sheet.header)] });
        let body: AppendResponse = self
            .send(Method::POST, url, Some(payload))
            .await?
            .json()
            .await?;

        let row_number = body
            .updates
            .and_then(|u| u.updated_range)
            .as_deref()
            .and_then(row_from_range);
        let inserted = sheet.push_row(row, row_number);
        info!(
            sheet = %sheet.title,
            row = inserted.row_number(),
            "Inserted tracking row"
        );
        Ok(inserted)
    }

    /// Write the full contents of `row` back to its range. This is the only
    /// path that mutates existing rows.
    pub async fn persist(&self, sheet: &Sheet, row: &TrackingRow) -> Result<()> {
        let range = sheet.row_range(row.row_number());
        let mut url = self.document_url(&["values", &range])?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let payload = json!({
            "majorDimension": "ROWS",
            "values": [row.to_cells(&sheet.header)],
        });
        self.send(Method::PUT, url, Some(payload)).await?;
        debug!(range = %range, "Persisted tracking row");
        Ok(())
    }

    fn document_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.api_base).map_err(|e| {
            TrackerError::Connect(format!("invalid api base '{}': {}", self.api_base, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                TrackerError::Connect(format!("api base '{}' cannot hold a path", self.api_base))
            })?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.document_id.as_str()])
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<reqwest::Response> {
        let token = self.auth.access_token().await?;
        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = api_error_message(&text);
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.auth.invalidate().await;
            return Err(TrackerError::Auth(message));
        }
        Err(TrackerError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl TrackingStore for SheetsClient {
    async fn open_sheet(&self) -> Result<Sheet> {
        let document = self.load_document().await?;
        let title = document.resolve_sheet(&self.sheet_name)?.to_string();
        let sheet = self.load_sheet(&title).await?;
        sheet.validate_columns(&required_columns())?;
        Ok(sheet)
    }

    async fn insert_row(&self, sheet: &mut Sheet, row: TrackingRow) -> Result<TrackingRow> {
        SheetsClient::insert_row(self, sheet, row).await
    }

    async fn persist(&self, sheet: &Sheet, row: &TrackingRow) -> Result<()> {
        SheetsClient::persist(self, sheet, row).await
    }
}

/// Read and parse the configured service-account key without contacting the API.
pub fn load_service_account(sheets: &SheetsConfig) -> Result<ServiceAccountKey> {
    let blob = credentials_blob(sheets)?;
    ServiceAccountKey::from_json(&blob)
}

fn credentials_blob(sheets: &SheetsConfig) -> Result<String> {
    if let Some(json) = sheets
        .credentials_json
        .as_deref()
        .filter(|j| !j.trim().is_empty())
    {
        return Ok(json.to_string());
    }
    let path = sheets.credentials_path.as_deref().unwrap_or_default();
    std::fs::read_to_string(path).map_err(|e| {
        TrackerError::ConfigMissing(format!("cannot read credentials file '{}': {}", path, e))
    })
}

/// Pull `error.message` out of an API error body, falling back to the raw text.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

fn cell_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
