//! Release-date parsing and age computation.
//!
//! Catalog feeds carry dates in whatever shape the upstream library exported:
//! ISO timestamps, `YYYY-MM-DD`, US-style `MM/DD/YYYY`, bare years, and the
//! occasional English phrase ("March 5, 2020"). Both recency decay and recency
//! interleaving age tracks through [`track_age_months`], so the two rule kinds
//! always agree on how old a track is.

use crate::Track;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Average month length in days (365.25 / 12).
pub const AVG_DAYS_PER_MONTH: f64 = 30.4375;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%m-%d-%Y", "%d.%m.%Y"];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%m/%d/%Y %H:%M:%S"];

/// Parse a release date string into a calendar date.
///
/// `reference` anchors the English fallback parser for relative phrases;
/// every fixed format ignores it. Returns `None` for empty or unrecognised
/// input.
pub fn parse_date(raw: &str, reference: NaiveDateTime) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    // Two-digit years (01/02/99 -> 1999-01-02); `%Y` would read them as year 99.
    if regex!(r"^\d{1,2}/\d{1,2}/\d{2}$").is_match(s) {
        if let Ok(d) = NaiveDate::parse_from_str(s, "%m/%d/%y") {
            return Some(d);
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }

    if let Some(caps) = regex!(r"^(\d{4})(?:-(\d{1,2}))?$").captures(s) {
        let year = caps.get(1)?.as_str().parse().ok()?;
        let month = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(1);
        return NaiveDate::from_ymd_opt(year, month, 1);
    }

    let anchor = Utc.from_utc_datetime(&reference);
    match chrono_english::parse_date_string(s, anchor, chrono_english::Dialect::Us) {
        Ok(dt) => Some(dt.date_naive()),
        Err(_) => None,
    }
}

/// Age of `date` in (fractional) months at `now`. Future dates are age 0.
pub fn age_in_months(date: NaiveDate, now: NaiveDate) -> f64 {
    let days = (now - date).num_days().max(0);
    days as f64 / AVG_DAYS_PER_MONTH
}

/// Age in months of the date stored in `track[field]`, if it parses.
pub fn track_age_months(track: &Track, field: &str, now: NaiveDateTime) -> Option<f64> {
    let raw = track.field_text(field)?;
    let date = parse_date(&raw, now)?;
    Some(age_in_months(date, now.date()))
}
