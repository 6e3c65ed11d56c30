//! Detection of the date and time formats people commonly type.

use chrono::format::{Parsed, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Tried in order, first match wins.
pub const DATE_FORMATS: [&str; 22] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%b %d, %Y %I:%M %p",
    "%B %d, %Y %I:%M %p",
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d-%b-%Y",
    "%d %B %Y",
    "%Y%m%d",
    "%Y",
    "%Y-%m",
    "%m-%Y",
    "%m/%Y",
    "%b %Y",
    "%b-%Y",
    "%B %Y",
];

pub const TIME_FORMATS: [&str; 3] = ["%H:%M:%S", "%I:%M %p", "%H:%M"];

/// Returns the first known date format that parses the whole of `text`.
///
/// Plain integers are never treated as dates, except for eight digit
/// `YYYYMMDD` stamps.
pub fn date_format_of(text: &str) -> Option<&'static str> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let digits_only = text.chars().all(|c| c.is_ascii_digit());
    if digits_only && text.len() != 8 {
        return None;
    }

    DATE_FORMATS
        .iter()
        .copied()
        .filter(|fmt| !digits_only || *fmt == "%Y%m%d")
        .find(|fmt| parse_datetime_with(text, fmt).is_some())
}

/// Returns the first known time format that parses the whole of `text`.
pub fn time_format_of(text: &str) -> Option<&'static str> {
    let text = text.trim();
    TIME_FORMATS
        .iter()
        .copied()
        .find(|fmt| NaiveTime::parse_from_str(text, fmt).is_ok())
}

/// Parses `text` with the first matching date format.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let fmt = date_format_of(text)?;
    parse_datetime_with(text.trim(), fmt)
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    parse_datetime(text).map(|dt| dt.date())
}

/// Parses `text` with the first matching time format.
pub fn parse_time(text: &str) -> Option<NaiveTime> {
    let fmt = time_format_of(text)?;
    NaiveTime::parse_from_str(text.trim(), fmt).ok()
}

/// Parses with one format. Missing day or month default to 1 and a missing
/// time defaults to midnight.
pub fn parse_datetime_with(text: &str, fmt: &str) -> Option<NaiveDateTime> {
    let mut parsed = Parsed::new();
    chrono::format::parse(&mut parsed, text, StrftimeItems::new(fmt)).ok()?;

    let date = match parsed.to_naive_date() {
        Ok(date) => date,
        Err(_) => {
            // Setting an already known field fails, which leaves it untouched.
            parsed.set_month(1).ok();
            parsed.set_day(1).ok();
            parsed.to_naive_date().ok()?
        }
    };
    let time = parsed.to_naive_time().unwrap_or(NaiveTime::MIN);
    Some(date.and_time(time))
}

/// Nanoseconds since midnight, the physical representation of a Polars `Time`.
pub fn time_to_nanos(time: NaiveTime) -> i64 {
    use chrono::Timelike as _;
    i64::from(time.num_seconds_from_midnight()) * 1_000_000_000 + i64::from(time.nanosecond())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_format_detection() {
        assert_eq!(date_format_of("2025-10-31"), Some("%Y-%m-%d"));
        assert_eq!(date_format_of("2025-10-31 08:30:00"), Some("%Y-%m-%d %H:%M:%S"));
        assert_eq!(date_format_of("10/31/2025"), Some("%m/%d/%Y"));
        assert_eq!(date_format_of("31/10/2025"), Some("%d/%m/%Y"));
        assert_eq!(date_format_of("October 31, 2025"), Some("%B %d, %Y"));
        assert_eq!(date_format_of("31-Oct-2025"), Some("%d-%b-%Y"));
        assert_eq!(date_format_of("2025-10"), Some("%Y-%m"));
        assert_eq!(date_format_of("Oct 2025"), Some("%b %Y"));
        assert_eq!(date_format_of("20251031"), Some("%Y%m%d"));
    }

    #[test]
    fn test_integers_and_text_are_not_dates() {
        assert_eq!(date_format_of("2025"), None);
        assert_eq!(date_format_of("17"), None);
        assert_eq!(date_format_of("Some text"), None);
        assert_eq!(date_format_of(""), None);
    }

    #[test]
    fn test_partial_dates_default_to_first_day() {
        let dt = parse_datetime("2025-10").unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2025, 10, 1).unwrap());
        let dt = parse_datetime("March 2024").unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn test_time_format_detection() {
        assert_eq!(time_format_of("12:30:13"), Some("%H:%M:%S"));
        assert_eq!(time_format_of("08:30 PM"), Some("%I:%M %p"));
        assert_eq!(time_format_of("08:30"), Some("%H:%M"));
        assert_eq!(time_format_of("2025-01-01"), None);

        let t = parse_time("08:30 PM").unwrap();
        assert_eq!(time_to_nanos(t), (20 * 3600 + 30 * 60) * 1_000_000_000);
    }
}
