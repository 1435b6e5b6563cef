//! Spreadsheet-backed tracking store.
//!
//! `SheetsClient` talks to the values API with a service-account token and
//! implements [`crate::tracker::TrackingStore`].

mod auth;
mod client;
mod document;

pub use auth::{ServiceAccountAuth, ServiceAccountKey, SPREADSHEETS_SCOPE};
pub use client::{load_service_account, SheetsClient};
pub use document::{column_letter, quote_title, row_from_range, Document, Sheet};
