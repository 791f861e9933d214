//! Timezone-correct local→UTC conversion.
//!
//! The UTC offset of a named zone is a property of the instant, not a
//! constant, so wall-clock inputs cannot be shifted by a fixed amount.
//! `local_to_utc` starts from a first guess (the wall-clock value read as
//! UTC), observes which local time that guess maps to in the zone, and
//! corrects the guess by the delta, repeating until stable. This stays
//! correct across DST transitions in either direction.

use crate::errors::AppError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex_lite::Regex;
use std::sync::OnceLock;

fn date_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid pattern"))
}

fn clock_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").expect("valid pattern"))
}

/// Parses a `YYYY-MM-DD` calendar date.
pub fn parse_date(value: &str) -> Result<NaiveDate, AppError> {
    let value = value.trim();
    if !date_pattern().is_match(value) {
        return Err(AppError::InvalidDateOrTime(format!(
            "invalid date: {value:?} (expected YYYY-MM-DD)"
        )));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        AppError::InvalidDateOrTime(format!("invalid date: {value:?} (expected YYYY-MM-DD)"))
    })
}

/// Parses a 24h `HH:MM` clock time.
pub fn parse_clock(value: &str) -> Result<NaiveTime, AppError> {
    let value = value.trim();
    if !clock_pattern().is_match(value) {
        return Err(AppError::InvalidDateOrTime(format!(
            "invalid time: {value:?} (expected HH:MM)"
        )));
    }
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| {
        AppError::InvalidDateOrTime(format!("invalid time: {value:?} (expected HH:MM)"))
    })
}

/// Resolves a wall-clock date and time in `tz` to the UTC instant it denotes.
pub fn local_to_utc(date: NaiveDate, time: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let wall = NaiveDateTime::new(date, time);
    let mut guess = Utc.from_utc_datetime(&wall);

    // Convergence takes at most two corrections; the bound guards against
    // oscillation inside a spring-forward gap.
    for _ in 0..3 {
        let observed = guess.with_timezone(&tz).naive_local();
        let delta = wall - observed;
        if delta == chrono::Duration::zero() {
            break;
        }
        guess += delta;
    }
    guess
}

/// UTC day stamp (`YYYY-MM-DD`) used in fingerprints.
pub fn utc_date_stamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Podgorica;

    fn at(date: &str, time: &str) -> DateTime<Utc> {
        local_to_utc(parse_date(date).unwrap(), parse_clock(time).unwrap(), Podgorica)
    }

    #[test]
    fn rejects_malformed_inputs() {
        assert!(parse_date("2025-7-01").is_err());
        assert!(parse_date("01-07-2025").is_err());
        assert!(parse_date("2025-13-40").is_err());
        assert!(parse_clock("9:00").is_err());
        assert!(parse_clock("24:00").is_err());
        assert!(parse_clock("10:60").is_err());
        assert!(parse_clock("10:00").is_ok());
    }

    #[test]
    fn winter_offset_is_plus_one() {
        assert_eq!(at("2025-01-15", "10:00").to_rfc3339(), "2025-01-15T09:00:00+00:00");
    }

    #[test]
    fn summer_offset_is_plus_two() {
        assert_eq!(at("2025-07-15", "10:00").to_rfc3339(), "2025-07-15T08:00:00+00:00");
    }

    #[test]
    fn spring_forward_night_loses_an_hour() {
        // 2025-03-30: clocks jump 02:00 -> 03:00 local. A 01:30 -> 05:00
        // wall-clock span is 3.5h on paper but only 2.5h of real time.
        let start = at("2025-03-30", "01:30");
        let end = at("2025-03-30", "05:00");
        assert!(end > start);
        assert_eq!((end - start).num_minutes(), 150);
        assert_eq!(start.to_rfc3339(), "2025-03-30T00:30:00+00:00");
        assert_eq!(end.to_rfc3339(), "2025-03-30T03:00:00+00:00");
    }

    #[test]
    fn fall_back_night_still_orders_correctly() {
        // 2025-10-26: clocks fall back 03:00 -> 02:00 local.
        let start = at("2025-10-26", "01:30");
        let end = at("2025-10-26", "05:00");
        assert!(end > start);
    }
}
