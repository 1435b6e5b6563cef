//! Tracking identifier codec.
//!
//! A CID is the URL-safe base64 form of a delimited string:
//! `company|email|subject|type|sentTime`. Older senders join fields with `||`;
//! when that separator is present anywhere in the decoded string it wins.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};

use crate::error::{Result, TrackerError};

const FIELD_SEPARATOR: &str = "|";
const LEGACY_FIELD_SEPARATOR: &str = "||";

/// Standard-alphabet decoder that tolerates missing padding and
/// non-canonical trailing bits, matching what browsers and mail clients send.
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decoded composite identifier carried by a tracking pixel.
///
/// Fields are positional; any field beyond the number of separated parts is
/// `None`. Content is not validated here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingIdentifier {
    pub company: Option<String>,
    pub recipient_email: Option<String>,
    pub subject: Option<String>,
    pub email_type: Option<String>,
    pub sent_time: Option<String>,
}

impl TrackingIdentifier {
    pub fn new(
        company: impl Into<String>,
        recipient_email: impl Into<String>,
        subject: impl Into<String>,
        email_type: impl Into<String>,
        sent_time: Option<String>,
    ) -> Self {
        Self {
            company: Some(company.into()),
            recipient_email: Some(recipient_email.into()),
            subject: Some(subject.into()),
            email_type: Some(email_type.into()),
            sent_time,
        }
    }

    /// Join the present fields with `|`, in wire order.
    pub fn to_delimited(&self) -> String {
        [
            &self.company,
            &self.recipient_email,
            &self.subject,
            &self.email_type,
            &self.sent_time,
        ]
        .into_iter()
        .map_while(|field| field.as_deref())
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR)
    }

    /// Encode into the CID transport form.
    pub fn encode(&self) -> String {
        encode(&self.to_delimited())
    }

    /// Interpret the sent-time field: numeric values are epoch milliseconds,
    /// anything else is tried as RFC 3339.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.sent_time.as_deref()?.trim();
        if let Ok(millis) = raw.parse::<i64>() {
            return Utc.timestamp_millis_opt(millis).single();
        }
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }
}

/// Encode a delimited identifier string as unpadded URL-safe base64.
pub fn encode(delimited: &str) -> String {
    URL_SAFE_NO_PAD.encode(delimited.as_bytes())
}

/// Decode a CID back into its delimited UTF-8 string.
///
/// `-`/`_` are mapped back to `+`/`/` and the input is padded to a multiple of
/// four before decoding, so both URL-safe and standard forms are accepted.
pub fn decode(cid: &str) -> Result<String> {
    let mut normalized: String = cid
        .trim()
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    if normalized.is_empty() {
        return Err(TrackerError::Decode("identifier is empty".to_string()));
    }

    let remainder = normalized.len() % 4;
    if remainder != 0 {
        normalized.extend(std::iter::repeat('=').take(4 - remainder));
    }

    let bytes = LENIENT_STANDARD
        .decode(normalized.as_bytes())
        .map_err(|e| TrackerError::Decode(e.to_string()))?;

    String::from_utf8(bytes).map_err(|e| TrackerError::Decode(format!("not UTF-8: {}", e)))
}

/// Split a decoded identifier into its positional fields.
pub fn parse_fields(decoded: &str) -> TrackingIdentifier {
    let separator = if decoded.contains(LEGACY_FIELD_SEPARATOR) {
        LEGACY_FIELD_SEPARATOR
    } else {
        FIELD_SEPARATOR
    };

    let mut parts = decoded.split(separator).map(str::to_string);
    TrackingIdentifier {
        company: parts.next(),
        recipient_email: parts.next(),
        subject: parts.next(),
        email_type: parts.next(),
        sent_time: parts.next(),
    }
}

/// Decode and parse a CID in one step.
pub fn decode_identifier(cid: &str) -> Result<TrackingIdentifier> {
    decode(cid).map(|decoded| parse_fields(&decoded))
}
