//! Shared helpers for integration tests
//!
//! `MemoryStore` is an in-process `TrackingStore` holding one worksheet, so the
//! tracking pipeline and HTTP routes can be exercised without a spreadsheet.

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mailpixel::error::{Result, TrackerError};
use mailpixel::row::{default_header, required_columns, TrackingRow};
use mailpixel::sheets::Sheet;
use mailpixel::{TrackingIdentifier, TrackingStore};

pub const SHEET_TITLE: &str = "Email Tracking Log";

/// 2024-03-01T12:00:00Z
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn identifier(email: &str) -> TrackingIdentifier {
    TrackingIdentifier::new(
        "Acme",
        email,
        "Hi",
        "Initial",
        Some("2024-03-01T09:00:00.000Z".to_string()),
    )
}

#[derive(Default)]
pub struct MemoryStore {
    sheet: Mutex<Option<Sheet>>,
    persisted: Mutex<Vec<TrackingRow>>,
    inserted: Mutex<Vec<TrackingRow>>,
    /// Error kind returned by `open_sheet`, e.g. to simulate an outage
    fail_open: Mutex<Option<TrackerError>>,
    /// Delay before `open_sheet` returns, to overlap concurrent opens
    open_delay: Mutex<Option<Duration>>,
}

impl MemoryStore {
    /// Store with an empty worksheet using the standard header.
    pub fn new() -> Self {
        Self::with_sheet(Sheet::new(SHEET_TITLE, default_header()))
    }

    pub fn with_sheet(sheet: Sheet) -> Self {
        Self {
            sheet: Mutex::new(Some(sheet)),
            ..Self::default()
        }
    }

    /// Store whose worksheet holds one row per identifier, CIDs encoded.
    pub fn seeded(identifiers: &[TrackingIdentifier]) -> Self {
        let mut sheet = Sheet::new(SHEET_TITLE, default_header());
        for id in identifiers {
            sheet.push_row(TrackingRow::initial(0, &id.encode(), id), None);
        }
        Self::with_sheet(sheet)
    }

    pub fn fail_open_with(&self, error: TrackerError) {
        *self.fail_open.lock().unwrap() = Some(error);
    }

    pub fn delay_open(&self, delay: Duration) {
        *self.open_delay.lock().unwrap() = Some(delay);
    }

    pub fn sheet(&self) -> Sheet {
        self.sheet.lock().unwrap().clone().expect("sheet present")
    }

    pub fn row(&self, row_number: usize) -> TrackingRow {
        self.sheet()
            .rows
            .into_iter()
            .find(|r| r.row_number() == row_number)
            .expect("row present")
    }

    pub fn persisted(&self) -> Vec<TrackingRow> {
        self.persisted.lock().unwrap().clone()
    }

    pub fn inserted(&self) -> Vec<TrackingRow> {
        self.inserted.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrackingStore for MemoryStore {
    async fn open_sheet(&self) -> Result<Sheet> {
        if let Some(error) = self.fail_open.lock().unwrap().take() {
            return Err(error);
        }
        let delay = *self.open_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let sheet = self
            .sheet
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| TrackerError::SheetNotFound(SHEET_TITLE.to_string()))?;
        sheet.validate_columns(&required_columns())?;
        Ok(sheet)
    }

    async fn insert_row(&self, sheet: &mut Sheet, row: TrackingRow) -> Result<TrackingRow> {
        let inserted = sheet.push_row(row, None);
        if let Some(stored) = self.sheet.lock().unwrap().as_mut() {
            stored.rows.push(inserted.clone());
        }
        self.inserted.lock().unwrap().push(inserted.clone());
        Ok(inserted)
    }

    async fn persist(&self, _sheet: &Sheet, row: &TrackingRow) -> Result<()> {
        if let Some(stored) = self.sheet.lock().unwrap().as_mut() {
            if let Some(existing) = stored
                .rows
                .iter_mut()
                .find(|r| r.row_number() == row.row_number())
            {
                *existing = row.clone();
            }
        }
        self.persisted.lock().unwrap().push(row.clone());
        Ok(())
    }
}
