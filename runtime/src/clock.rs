//! Capture times. The upstream league calendar runs on New York time, so
//! day boundaries (daily counter, snapshot rotation) use it too.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::America::New_York;
use chrono_tz::Tz;

pub fn to_new_york(at: DateTime<Utc>) -> DateTime<Tz> {
    at.with_timezone(&New_York)
}

/// `2026-10-18T09:30:00.123456-04:00`
pub fn ny_timestamp(at: DateTime<Utc>) -> String {
    to_new_york(at).to_rfc3339_opts(chrono::SecondsFormat::Micros, false)
}

pub fn ny_date(at: DateTime<Utc>) -> NaiveDate {
    to_new_york(at).date_naive()
}

pub fn utc_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
