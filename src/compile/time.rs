//! Time-literal scanning and duration parsing
//!
//! Calendar time literals use the extended form
//! `YYYY.MM.DD[_HH:MM[:SS[.fff]]][_ZONE[±HH[MM]]]` and evaluate to seconds
//! since the Unix epoch. Offset-less zone names (UTC, UT, GMT, Z, TAI) read
//! as +0; a trailing `±HH[MM]` applies a fixed offset; zoneless literals are
//! UTC.
//!
//! `-` is both a legal character inside a literal (a negative zone offset)
//! and the range separator, so scanning is greedy with one backtracking
//! retry: take the longest match, and if the character that follows is not a
//! terminator, truncate the input at its first `-` and rescan. Anything
//! still ambiguous after that is left to the caller to reject.

use chrono::{LocalResult, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Result of scanning one time literal off the front of the input
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TimeScan {
    /// Seconds since the Unix epoch
    pub seconds: f64,
    /// Bytes of input consumed
    pub len: usize,
}

/// Units accepted after a duration value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DurationUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    /// `u` — widths of the active keyword's slot
    Slots,
}

impl DurationUnit {
    /// Conversion factor to seconds; `None` for slot widths, which need the
    /// keyword's step as context
    pub(crate) fn seconds(&self) -> Option<f64> {
        match self {
            Self::Seconds => Some(1.0),
            Self::Minutes => Some(60.0),
            Self::Hours => Some(3600.0),
            Self::Days => Some(86400.0),
            Self::Slots => None,
        }
    }
}

/// Result of scanning a duration literal
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct DurationScan {
    pub value: f64,
    pub unit: DurationUnit,
    /// Bytes of input consumed
    pub len: usize,
}

fn literal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<y>\d{1,4})\.(?P<mo>\d{1,2})\.(?P<d>\d{1,2})(?:_(?P<h>\d{1,2}):(?P<mi>\d{1,2})(?::(?P<s>\d{1,2}(?:\.\d+)?))?)?(?:_(?P<z>[A-Za-z]+)(?P<off>[+-]\d{1,4})?)?",
        )
        .expect("time-literal regex")
    })
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?(?:\d+(?:\.\d*)?|\.\d+)").expect("number regex"))
}

/// Length of the greedy time-literal match at the front of `input`
fn raw_match(input: &str) -> Option<usize> {
    literal_re().find(input).map(|m| m.end())
}

/// Evaluate a complete time literal to epoch seconds
fn to_epoch(literal: &str) -> Option<f64> {
    let caps = literal_re().captures(literal)?;
    if caps.get(0)?.end() != literal.len() {
        return None;
    }

    let year: i32 = caps["y"].parse().ok()?;
    let month: u32 = caps["mo"].parse().ok()?;
    let day: u32 = caps["d"].parse().ok()?;
    let hour: u32 = caps.name("h").map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    let minute: u32 = caps.name("mi").map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    let second: f64 = caps.name("s").map_or(Ok(0.0), |m| m.as_str().parse()).ok()?;

    let whole = second.trunc() as u32;
    let frac = second - second.trunc();

    let base = match Utc.with_ymd_and_hms(year, month, day, hour, minute, whole) {
        LocalResult::Single(dt) => dt.timestamp() as f64,
        _ => return None,
    };

    let offset = caps.name("off").map_or(0.0, |m| zone_offset(m.as_str()));
    Some(base + frac - offset)
}

/// Seconds of a `±HH` or `±HHMM` zone offset
fn zone_offset(text: &str) -> f64 {
    let (sign, digits) = match text.as_bytes()[0] {
        b'-' => (-1.0, &text[1..]),
        _ => (1.0, &text[1..]),
    };
    let (hours, minutes) = if digits.len() > 2 {
        let split = digits.len() - 2;
        (
            digits[..split].parse::<f64>().unwrap_or(0.0),
            digits[split..].parse::<f64>().unwrap_or(0.0),
        )
    } else {
        (digits.parse::<f64>().unwrap_or(0.0), 0.0)
    };
    sign * (hours * 3600.0 + minutes * 60.0)
}

/// Whether the text after a candidate match terminates a value
fn terminated(input: &str, len: usize) -> bool {
    let rest = input[len..].trim_start();
    matches!(rest.as_bytes().first(), None | Some(b']' | b'-' | b'/' | b',' | b'@'))
}

/// Scan a time value off the front of `input`
///
/// Greedy first; on a non-terminator boundary, one retry with the input
/// truncated at its first `-`. Returns `None` when no time literal can be
/// carved out.
pub(crate) fn scan_time_value(input: &str) -> Option<TimeScan> {
    let len = raw_match(input)?;
    if terminated(input, len) {
        return to_epoch(&input[..len]).map(|seconds| TimeScan { seconds, len });
    }

    let dash = input[..len].find('-')?;
    let cut = &input[..dash];
    let retry = raw_match(cut)?;
    if retry != cut.len() {
        return None;
    }
    to_epoch(cut).map(|seconds| TimeScan { seconds, len: retry })
}

/// Scan a duration literal (`<float><s|m|h|d|u>`) off the front of `input`
pub(crate) fn scan_duration(input: &str) -> Option<DurationScan> {
    let number = number_re().find(input)?;
    let value: f64 = number.as_str().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let unit = match input.as_bytes().get(number.end())? {
        b's' => DurationUnit::Seconds,
        b'm' => DurationUnit::Minutes,
        b'h' => DurationUnit::Hours,
        b'd' => DurationUnit::Days,
        b'u' => DurationUnit::Slots,
        _ => return None,
    };
    Some(DurationScan {
        value,
        unit,
        len: number.end() + 1,
    })
}

/// Whether the input starts with a duration literal
pub(crate) fn is_duration(input: &str) -> bool {
    scan_duration(input).is_some()
}

/// Evaluate the body of a `$(…)` macro to epoch seconds
///
/// Accepts either a complete time literal or a bare number already in
/// epoch seconds.
pub(crate) fn macro_seconds(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Some(len) = raw_match(text) {
        if len == text.len() {
            return to_epoch(text);
        }
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    const JAN1_2014: f64 = 1388534400.0;

    #[test]
    fn test_date_only() {
        let scan = scan_time_value("2014.01.01]").unwrap();
        assert_eq!(scan.seconds, JAN1_2014);
        assert_eq!(scan.len, 10);
    }

    #[test]
    fn test_full_literal_with_zone() {
        let scan = scan_time_value("2014.01.01_00:00:00_UTC]").unwrap();
        assert_eq!(scan.seconds, JAN1_2014);
        assert_eq!(scan.len, 23);
    }

    #[test]
    fn test_clock_without_seconds() {
        let scan = scan_time_value("2014.01.01_12:30]").unwrap();
        assert_eq!(scan.seconds, JAN1_2014 + 12.0 * 3600.0 + 30.0 * 60.0);
    }

    #[test]
    fn test_fractional_seconds() {
        let scan = scan_time_value("2014.01.01_00:00:30.5]").unwrap();
        assert_eq!(scan.seconds, JAN1_2014 + 30.5);
    }

    #[test]
    fn test_zone_offsets() {
        let plus = scan_time_value("2014.01.01_00:00:00_UTC+01]").unwrap();
        assert_eq!(plus.seconds, JAN1_2014 - 3600.0);

        let minus = scan_time_value("2014.01.01_00:00:00_UTC-0130]").unwrap();
        assert_eq!(minus.seconds, JAN1_2014 + 5400.0);
    }

    #[test]
    fn test_greedy_match_backtracks_at_range_separator() {
        // Greedily this reads as zone offset "UTC-2014"; the boundary check
        // fails and the scan retries truncated at the dash.
        let input = "2014.01.01_00:00:00_UTC-2014.01.02_00:00:00_UTC]";
        let scan = scan_time_value(input).unwrap();
        assert_eq!(scan.len, 23);
        assert_eq!(scan.seconds, JAN1_2014);
        assert_eq!(&input[scan.len..scan.len + 1], "-");
    }

    #[test]
    fn test_stride_terminates_literal() {
        let scan = scan_time_value("2014.01.02_00:00:00_UTC@1d]").unwrap();
        assert_eq!(scan.seconds, JAN1_2014 + 86400.0);
        assert_eq!(scan.len, 23);
    }

    #[test]
    fn test_invalid_calendar_date_rejected() {
        assert!(scan_time_value("2014.13.01]").is_none());
        assert!(scan_time_value("abc]").is_none());
    }

    #[test]
    fn test_durations() {
        let scan = scan_duration("5d@").unwrap();
        assert_eq!((scan.value, scan.unit, scan.len), (5.0, DurationUnit::Days, 2));

        let scan = scan_duration("1.5h]").unwrap();
        assert_eq!((scan.value, scan.unit), (1.5, DurationUnit::Hours));

        let scan = scan_duration("100u]").unwrap();
        assert_eq!(scan.unit, DurationUnit::Slots);
        assert!(scan.unit.seconds().is_none());

        assert!(scan_duration("5x").is_none());
        assert!(!is_duration("1000/5d"));
    }

    #[test]
    fn test_macro_seconds() {
        assert_eq!(macro_seconds("2014.01.01"), Some(JAN1_2014));
        assert_eq!(macro_seconds(" 1388534400.5 "), Some(1388534400.5));
        assert_eq!(macro_seconds("not a time"), None);
    }
}
