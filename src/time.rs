//! User-supplied time strings and their ISO-8601 rendering.

use std::fmt::{Display, Formatter};

use chrono::{
    DateTime,
    FixedOffset,
    Local,
    NaiveDate,
    NaiveDateTime,
    NaiveTime,
    TimeDelta,
    Timelike,
};

/// Formats accepted verbatim, before falling back to the general ISO-8601 parsing.
const LITERAL_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// General ISO-8601 date-times with an offset. `%.f` also matches no fraction at all.
const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

/// General ISO-8601 date-times without an offset.
const NAIVE_FORMATS: [&str; 4] =
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"];

#[derive(Debug, thiserror::Error)]
#[error("Invalid time format: {0}. Use YYYY-MM-DD or ISO format.")]
pub struct InvalidTimeFormat(pub String);

/// Normalized point in time, either naive (wall clock) or offset-aware.
#[must_use]
#[derive(Copy, Clone, Debug, Eq, PartialEq, derive_more::From)]
pub enum Timestamp {
    Naive(NaiveDateTime),
    Aware(DateTime<FixedOffset>),
}

impl Timestamp {
    /// Current local wall-clock time.
    pub fn now() -> Self {
        Self::Naive(Local::now().naive_local())
    }

    /// `chrono` represents `:60` seconds as an overflowing fraction.
    fn is_leap_second(&self) -> bool {
        let nanosecond = match self {
            Self::Naive(timestamp) => timestamp.nanosecond(),
            Self::Aware(timestamp) => timestamp.nanosecond(),
        };
        nanosecond >= 1_000_000_000
    }

    /// Local wall-clock time `delta` ago, or [`None`] when out of range.
    pub fn ago(delta: TimeDelta) -> Option<Self> {
        Local::now().naive_local().checked_sub_signed(delta).map(Self::Naive)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Naive(timestamp) => write_naive(f, timestamp),
            Self::Aware(timestamp) => {
                write_naive(f, &timestamp.naive_local())?;
                write!(f, "{}", timestamp.format("%:z"))
            }
        }
    }
}

/// Seconds are always present, the fraction only when non-zero, truncated to microseconds.
fn write_naive(f: &mut Formatter<'_>, timestamp: &NaiveDateTime) -> std::fmt::Result {
    write!(f, "{}", timestamp.format("%Y-%m-%dT%H:%M:%S"))?;
    let micros = (timestamp.nanosecond() % 1_000_000_000) / 1_000;
    if micros != 0 {
        write!(f, ".{micros:06}")?;
    }
    Ok(())
}

/// Parse a user-supplied time string.
///
/// Tries the dates `YYYY-MM-DD` and `YYYYMMDD` (midnight), `YYYY-MM-DDTHH:MM:SS` and
/// `YYYY-MM-DD HH:MM:SS` first, then an hour without minutes, and then general ISO-8601 with
/// a trailing `Z` meaning `+00:00`. Leap seconds are rejected.
pub fn normalize_time(input: &str) -> Result<Timestamp, InvalidTimeFormat> {
    parse(input)
        .filter(|timestamp| !timestamp.is_leap_second())
        .ok_or_else(|| InvalidTimeFormat(input.to_owned()))
}

fn parse(input: &str) -> Option<Timestamp> {
    if let Some(date) = parse_date(input) {
        return Some(date.and_time(NaiveTime::MIN).into());
    }
    LITERAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
        .or_else(|| parse_hour_only(input))
        .map(Timestamp::Naive)
        .or_else(|| parse_iso(input))
}

fn parse_date(input: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d").ok().or_else(|| {
        // `%d` also matches a single digit, hence the exact width.
        (input.len() == 8 && input.bytes().all(|byte| byte.is_ascii_digit()))
            .then(|| NaiveDate::parse_from_str(input, "%Y%m%d").ok())
            .flatten()
    })
}

/// `YYYY-MM-DDTHH` or `YYYY-MM-DD HH`.
fn parse_hour_only(input: &str) -> Option<NaiveDateTime> {
    let (date, hour) = input.split_at_checked(10)?;
    let hour = hour.strip_prefix(['T', ' '])?;
    if hour.len() != 2 || !hour.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?.and_hms_opt(hour.parse().ok()?, 0, 0)
}

fn parse_iso(input: &str) -> Option<Timestamp> {
    let input = input
        .strip_suffix('Z')
        .map_or_else(|| input.to_owned(), |stripped| format!("{stripped}+00:00"));
    OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(&input, format).ok())
        .map(Timestamp::Aware)
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(&input, format).ok())
                .map(Timestamp::Naive)
        })
}
