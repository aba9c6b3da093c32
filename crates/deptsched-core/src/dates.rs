//! Date helpers shared by the aggregator, the store filters and the
//! discussion threads.
//!
//! Store rows carry dates in a handful of shapes (plain `YYYY-MM-DD`,
//! naive date-times, RFC 3339 with an offset, unix seconds). Everything is
//! normalized to a UTC `NaiveDateTime` before it is compared or sorted.

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Inclusive calendar-day range. Either bound may be absent while the user
/// is still picking dates; such a range never produces a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Range with possibly-missing bounds
    pub fn partial(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn is_complete(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    /// Half-open timestamp bounds `[start 00:00, day after end 00:00)`.
    ///
    /// Returns `Ok(None)` when a bound is missing and an error when the
    /// range is inverted.
    pub fn bounds(&self) -> Result<Option<(NaiveDateTime, NaiveDateTime)>, ValidationError> {
        let (Some(start), Some(end)) = (self.start, self.end) else {
            return Ok(None);
        };
        if start > end {
            return Err(ValidationError::InvertedDateRange {
                start: format_date(start),
                end: format_date(end),
            });
        }
        let lower = start_of_day(start);
        // Day after end; saturate at the last representable day
        let upper = end
            .checked_add_days(Days::new(1))
            .map(start_of_day)
            .unwrap_or(NaiveDateTime::MAX);
        Ok(Some((lower, upper)))
    }

    /// Whether the timestamp falls on one of the range's days
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        match self.bounds() {
            Ok(Some((lower, upper))) => at >= lower && at < upper,
            _ => false,
        }
    }
}

pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a textual timestamp in any of the accepted shapes, normalized to UTC.
pub fn parse_timestamp_str(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }
    parse_date(s).map(start_of_day)
}

/// Parse a row value (string or unix seconds) as a timestamp.
pub fn parse_timestamp(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::String(s) => parse_timestamp_str(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.naive_utc()),
        _ => None,
    }
}

pub fn parse_utc(value: &Value) -> Option<DateTime<Utc>> {
    parse_timestamp(value).map(|naive| naive.and_utc())
}

/// Current time as stored in rows (RFC 3339, UTC)
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}
