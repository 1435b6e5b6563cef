//! Spreadsheet document and worksheet model.

use crate::error::{Result, TrackerError};
use crate::row::TrackingRow;

/// A spreadsheet document and the titles of its worksheets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub sheet_titles: Vec<String>,
}

impl Document {
    /// Find a worksheet title: exact match first, then case-insensitive.
    pub fn resolve_sheet(&self, name: &str) -> Result<&str> {
        if let Some(title) = self.sheet_titles.iter().find(|t| t.as_str() == name) {
            return Ok(title);
        }
        let wanted = name.to_lowercase();
        self.sheet_titles
            .iter()
            .find(|t| t.to_lowercase() == wanted)
            .map(String::as_str)
            .ok_or_else(|| TrackerError::SheetNotFound(name.to_string()))
    }
}

/// A loaded worksheet: header row plus data rows in sheet order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub title: String,
    pub header: Vec<String>,
    pub rows: Vec<TrackingRow>,
}

impl Sheet {
    pub fn new(title: impl Into<String>, header: Vec<String>) -> Self {
        Self {
            title: title.into(),
            header,
            rows: Vec::new(),
        }
    }

    /// Build from a raw value grid; the first row is the header.
    pub fn from_values(title: impl Into<String>, values: Vec<Vec<String>>) -> Self {
        let mut grid = values.into_iter();
        let header: Vec<String> = grid
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(|h| h.trim().to_string())
            .collect();
        let rows = grid
            .enumerate()
            .map(|(idx, values)| TrackingRow::from_values(idx + 2, &header, &values))
            .collect();
        Self {
            title: title.into(),
            header,
            rows,
        }
    }

    /// Fail with the list of required columns absent from the header.
    pub fn validate_columns(&self, required: &[String]) -> Result<()> {
        let missing: Vec<String> = required
            .iter()
            .filter(|column| !self.header.iter().any(|h| h == *column))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(TrackerError::Schema { missing })
        }
    }

    /// Row number the next appended row will land on.
    pub fn next_row_number(&self) -> usize {
        self.rows
            .iter()
            .map(TrackingRow::row_number)
            .max()
            .unwrap_or(1)
            + 1
    }

    /// Record an appended row locally and return a copy of it.
    pub fn push_row(&mut self, mut row: TrackingRow, row_number: Option<usize>) -> TrackingRow {
        let number = row_number.unwrap_or_else(|| self.next_row_number());
        row.set_row_number(number);
        self.rows.push(row.clone());
        row
    }

    /// A1 range covering one full row, e.g. `'Email Tracking Log'!A5:Z5`.
    pub fn row_range(&self, row_number: usize) -> String {
        let last = column_letter(self.header.len().saturating_sub(1));
        format!(
            "{}!A{}:{}{}",
            quote_title(&self.title),
            row_number,
            last,
            row_number
        )
    }

    /// A1 range covering the whole worksheet.
    pub fn full_range(&self) -> String {
        quote_title(&self.title)
    }
}

/// Quote a sheet title for use in an A1 range.
pub fn quote_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

/// Zero-based column index to A1 letters: 0 → A, 25 → Z, 26 → AA.
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.iter().rev().map(|b| *b as char).collect()
}

/// Extract the starting row number from a range like `'Log'!A5:Z5`.
pub fn row_from_range(range: &str) -> Option<usize> {
    let cells = range.rsplit_once('!').map(|(_, c)| c).unwrap_or(range);
    let first = cells.split(':').next()?;
    let digits: String = first.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}
