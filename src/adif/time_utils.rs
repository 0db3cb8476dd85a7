//! Time Utilities
//!
//! Parsing and validation of ADIF date/time fields into UTC timestamps.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Normalize time string to 6-character HHMMSS format (ADIF standard)
///
/// Accepts HHMM, HHMMSS and "HH:MM[:SS]". Returns None for anything else.
pub fn normalize_time_to_hhmmss(time_str: &str) -> Option<String> {
    let clean = time_str.trim().replace(':', "");
    if !clean.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match clean.len() {
        4 => Some(format!("{}00", clean)),
        6 => Some(clean),
        _ => None,
    }
}

fn parse_adif_date(date_str: &str) -> Option<NaiveDate> {
    let clean = date_str.trim();
    if clean.len() != 8 || !clean.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(clean, "%Y%m%d").ok()
}

fn parse_adif_time(time_str: &str) -> Option<NaiveTime> {
    let hhmmss = normalize_time_to_hhmmss(time_str)?;
    NaiveTime::parse_from_str(&hhmmss, "%H%M%S").ok()
}

/// Combine ADIF QSO_DATE and TIME_ON into a UTC timestamp
pub fn parse_qso_timestamp(qso_date: &str, time_on: &str) -> Result<DateTime<Utc>, String> {
    let date = parse_adif_date(qso_date)
        .ok_or_else(|| format!("invalid qso_date {:?} (expected YYYYMMDD)", qso_date))?;
    let time = parse_adif_time(time_on)
        .ok_or_else(|| format!("invalid time_on {:?} (expected HHMM or HHMMSS)", time_on))?;
    Ok(NaiveDateTime::new(date, time).and_utc())
}

/// Canonical storage form; exact string equality means exact timestamp match
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
