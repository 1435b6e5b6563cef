// HTTP request handlers for server mode
//
// Pixel endpoint plus health and configuration status checks

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use metrics::counter;
use serde_json::json;
use tracing::{debug, info};

use crate::codec::decode_identifier;
use crate::sheets::load_service_account;
use crate::{AppError, AppState};

/// 1x1 transparent GIF89a served for every accepted pixel request.
pub const TRANSPARENT_GIF: [u8; 43] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

/// First non-empty `cid` in the query string. Repeated keys are accepted
/// rather than rejected, since mail clients and link rewriters sometimes
/// duplicate parameters.
fn first_cid(params: Vec<(String, String)>) -> Option<String> {
    params
        .into_iter()
        .find(|(key, value)| key == "cid" && !value.is_empty())
        .map(|(_, value)| value)
}

/// GET /open?cid=.. - Tracking pixel
///
/// Any non-empty cid gets the pixel. Recording runs on a detached task, so
/// decode, lookup and write failures never change the response.
pub(crate) async fn handle_open(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let Some(cid) = first_cid(params) else {
        counter!("pixel.rejected", 1);
        return Err(AppError::with_status(
            StatusCode::BAD_REQUEST,
            anyhow::anyhow!("Missing cid parameter"),
        ));
    };
    counter!("pixel.requests", 1);
    let observed_at = Utc::now();

    match decode_identifier(&cid) {
        Ok(identifier) => {
            info!(
                cid = %cid,
                company = identifier.company.as_deref().unwrap_or_default(),
                email = identifier.recipient_email.as_deref().unwrap_or_default(),
                subject = identifier.subject.as_deref().unwrap_or_default(),
                email_type = identifier.email_type.as_deref().unwrap_or_default(),
                "Email opened"
            );
            match &state.tracker {
                Some(tracker) => {
                    tracker.clone().spawn_open(cid, observed_at);
                }
                None => debug!(cid = %cid, "Tracking log not configured, open not recorded"),
            }
        }
        Err(e) => info!(cid = %cid, error = %e, "Ignoring undecodable tracking identifier"),
    }

    Ok(pixel_response())
}

fn pixel_response() -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/gif"),
            (
                header::CACHE_CONTROL,
                "no-store, no-cache, must-revalidate, proxy-revalidate",
            ),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        TRANSPARENT_GIF.as_slice(),
    )
        .into_response()
}

/// GET /health - Basic health check
pub(crate) async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /status - Reports whether the tracking log settings are present and
/// the credentials parse. Does not contact the spreadsheet.
pub(crate) async fn status_check(State(state): State<AppState>) -> impl IntoResponse {
    let sheets = &state.config.sheets;

    let missing = sheets.missing_settings();
    if !missing.is_empty() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "error",
                "message": "Tracking log is not configured",
                "missing": missing,
            })),
        );
    }

    match load_service_account(sheets) {
        Ok(key) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "message": "Tracking log configuration is valid",
                "document_id": sheets.document_id.as_deref().map(str::trim),
                "sheet_name": sheets.sheet_name,
                "client_email": key.client_email,
                "tracking_enabled": state.tracker.is_some(),
            })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "error",
                "message": e.to_string(),
                "missing": Vec::<&str>::new(),
            })),
        ),
    }
}
