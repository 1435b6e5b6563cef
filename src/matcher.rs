//! Locate the log row for an open event.
//!
//! The CID column is authoritative. When it has no hit, rows are matched on
//! (Company Name, Email ID, Subject, Email Type) so events survive encoding
//! drift between sender and tracker. First match in sheet order wins.

use crate::codec::TrackingIdentifier;
use crate::row::{columns, TrackingRow};

/// How a row was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    ExactCid,
    Fields,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::ExactCid => "cid",
            MatchKind::Fields => "fields",
        }
    }
}

/// Index into the row slice plus how it was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowMatch {
    pub index: usize,
    pub kind: MatchKind,
}

/// First row whose CID cell equals the trimmed identifier.
pub fn find_exact(rows: &[TrackingRow], cid: &str) -> Option<usize> {
    let cid = cid.trim();
    if cid.is_empty() {
        return None;
    }
    rows.iter().position(|row| row.get(columns::CID) == cid)
}

/// First row whose four identity fields all equal the decoded identifier.
/// An identifier with any of the four fields absent never matches.
pub fn find_by_fields(rows: &[TrackingRow], identifier: &TrackingIdentifier) -> Option<usize> {
    let (Some(company), Some(email), Some(subject), Some(email_type)) = (
        identifier.company.as_deref(),
        identifier.recipient_email.as_deref(),
        identifier.subject.as_deref(),
        identifier.email_type.as_deref(),
    ) else {
        return None;
    };

    rows.iter().position(|row| {
        row.get(columns::COMPANY_NAME) == company
            && row.get(columns::EMAIL_ID) == email
            && row.get(columns::SUBJECT) == subject
            && row.get(columns::EMAIL_TYPE) == email_type
    })
}

/// Exact CID lookup with field-based fallback.
pub fn find_row(
    rows: &[TrackingRow],
    cid: &str,
    identifier: &TrackingIdentifier,
) -> Option<RowMatch> {
    if let Some(index) = find_exact(rows, cid) {
        return Some(RowMatch {
            index,
            kind: MatchKind::ExactCid,
        });
    }
    find_by_fields(rows, identifier).map(|index| RowMatch {
        index,
        kind: MatchKind::Fields,
    })
}
