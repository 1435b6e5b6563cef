//! Tracking log row model and column layout.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::codec::TrackingIdentifier;

/// Header names of the "Email Tracking Log" worksheet.
pub mod columns {
    pub const CID: &str = "CID";
    pub const COMPANY_NAME: &str = "Company Name";
    pub const EMAIL_ID: &str = "Email ID";
    pub const SUBJECT: &str = "Subject";
    pub const EMAIL_TYPE: &str = "Email Type";
    pub const SENT_TIME: &str = "Sent Time";
    pub const TOTAL_OPENS: &str = "Total Opens";
    pub const LAST_SEEN_TIME: &str = "Last Seen Time";

    pub const TOTAL_PDF_VIEWS: &str = "Total PDF Views";
    pub const LAST_PDF_VIEW: &str = "Last PDF View";
    pub const TOTAL_CAL_CLICKS: &str = "Total Cal Clicks";
    pub const LAST_CAL_CLICK: &str = "Last Cal Click";
    pub const TOTAL_WEB_CLICKS: &str = "Total Web Clicks";
    pub const LAST_WEB_CLICK: &str = "Last Web Click";
    pub const TOTAL_PORTFOLIO_LINK_CLICKS: &str = "Total Portfolio Link Clicks";
    pub const LAST_PORTFOLIO_LINK_CLICK: &str = "Last Portfolio Link Click";

    /// Number of `Seen N` history slots.
    pub const SEEN_SLOTS: usize = 10;

    /// Header of history slot `n` (1-based).
    pub fn seen(n: usize) -> String {
        format!("Seen {}", n)
    }

    /// Counters owned by other tracking paths, initialized to zero on insert.
    pub const ENGAGEMENT_COUNTERS: [&str; 4] = [
        TOTAL_PDF_VIEWS,
        TOTAL_CAL_CLICKS,
        TOTAL_WEB_CLICKS,
        TOTAL_PORTFOLIO_LINK_CLICKS,
    ];

    /// Timestamps owned by other tracking paths, initialized empty on insert.
    pub const ENGAGEMENT_TIMESTAMPS: [&str; 4] = [
        LAST_PDF_VIEW,
        LAST_CAL_CLICK,
        LAST_WEB_CLICK,
        LAST_PORTFOLIO_LINK_CLICK,
    ];
}

/// Columns the open-tracking path reads or writes; a sheet missing any of
/// these is rejected before matching.
pub fn required_columns() -> Vec<String> {
    let mut required: Vec<String> = [
        columns::CID,
        columns::COMPANY_NAME,
        columns::EMAIL_ID,
        columns::SUBJECT,
        columns::EMAIL_TYPE,
        columns::TOTAL_OPENS,
        columns::LAST_SEEN_TIME,
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();
    required.extend((1..=columns::SEEN_SLOTS).map(columns::seen));
    required
}

/// Full header layout, in sheet order, for a freshly created log.
pub fn default_header() -> Vec<String> {
    let mut header: Vec<String> = [
        columns::CID,
        columns::COMPANY_NAME,
        columns::EMAIL_ID,
        columns::SUBJECT,
        columns::EMAIL_TYPE,
        columns::SENT_TIME,
        columns::TOTAL_OPENS,
        columns::LAST_SEEN_TIME,
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();
    header.extend((1..=columns::SEEN_SLOTS).map(columns::seen));
    for (total, last) in columns::ENGAGEMENT_COUNTERS
        .iter()
        .zip(columns::ENGAGEMENT_TIMESTAMPS.iter())
    {
        header.push(total.to_string());
        header.push(last.to_string());
    }
    header
}

/// One row of the tracking log, addressed by header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingRow {
    /// 1-based row number in the worksheet (the header is row 1)
    row_number: usize,
    cells: BTreeMap<String, String>,
}

impl TrackingRow {
    pub fn new(row_number: usize) -> Self {
        Self {
            row_number,
            cells: BTreeMap::new(),
        }
    }

    /// Build a row from raw cell values aligned with `header`.
    /// Short rows (the API trims trailing blanks) read as empty cells.
    pub fn from_values(row_number: usize, header: &[String], values: &[String]) -> Self {
        let cells = header
            .iter()
            .enumerate()
            .filter(|(_, name)| !name.is_empty())
            .map(|(idx, name)| {
                let value = values.get(idx).cloned().unwrap_or_default();
                (name.clone(), value)
            })
            .collect();
        Self { row_number, cells }
    }

    /// Build the initial row for a newly observed identifier: identity
    /// fields filled, counters at zero, timestamps empty.
    pub fn initial(row_number: usize, cid: &str, identifier: &TrackingIdentifier) -> Self {
        let mut row = Self::new(row_number);
        row.set(columns::CID, cid.trim());
        row.set(
            columns::COMPANY_NAME,
            identifier.company.clone().unwrap_or_default(),
        );
        row.set(
            columns::EMAIL_ID,
            identifier.recipient_email.clone().unwrap_or_default(),
        );
        row.set(
            columns::SUBJECT,
            identifier.subject.clone().unwrap_or_default(),
        );
        row.set(
            columns::EMAIL_TYPE,
            identifier.email_type.clone().unwrap_or_default(),
        );
        let sent = match identifier.sent_at() {
            Some(ts) => crate::stats::format_timestamp(ts),
            None => identifier.sent_time.clone().unwrap_or_default(),
        };
        row.set(columns::SENT_TIME, sent);
        row.set(columns::TOTAL_OPENS, "0");
        row.set(columns::LAST_SEEN_TIME, "");
        for n in 1..=columns::SEEN_SLOTS {
            row.set(&columns::seen(n), "");
        }
        for counter in columns::ENGAGEMENT_COUNTERS {
            row.set(counter, "0");
        }
        for timestamp in columns::ENGAGEMENT_TIMESTAMPS {
            row.set(timestamp, "");
        }
        row
    }

    pub fn row_number(&self) -> usize {
        self.row_number
    }

    pub(crate) fn set_row_number(&mut self, row_number: usize) {
        self.row_number = row_number;
    }

    /// Cell value for `column`, empty when the column or value is absent.
    pub fn get(&self, column: &str) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        self.cells.insert(column.to_string(), value.into());
    }

    /// Cell values in `header` order.
    pub fn to_values(&self, header: &[String]) -> Vec<String> {
        header.iter().map(|name| self.get(name).to_string()).collect()
    }

    /// Typed cells in `header` order, for writing back to the sheet.
    ///
    /// Counter columns holding a whole number go out as numbers so sheet
    /// formulas can sum them. Columns with a blank header are not tracked
    /// and go out as null, which the values API skips, so whatever the
    /// sheet holds there is left alone.
    pub fn to_cells(&self, header: &[String]) -> Vec<Value> {
        header
            .iter()
            .map(|name| {
                if name.is_empty() {
                    return Value::Null;
                }
                let value = self.get(name);
                if is_counter(name) {
                    if let Ok(count) = value.parse::<u64>() {
                        return Value::from(count);
                    }
                }
                Value::String(value.to_string())
            })
            .collect()
    }
}

fn is_counter(column: &str) -> bool {
    column == columns::TOTAL_OPENS || columns::ENGAGEMENT_COUNTERS.contains(&column)
}
