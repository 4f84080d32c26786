//! Candle periods and lookback windows

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing period or lookback strings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeriodParseError {
    #[error("Unknown candle period: {0}")]
    UnknownPeriod(String),

    #[error("Invalid lookback window: {0}")]
    InvalidLookback(String),
}

/// A candle granularity.
///
/// The wire/database representation is the short code (`1S` … `1MO`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CandlePeriod {
    OneSecond,
    FiveSeconds,
    TenSeconds,
    FifteenSeconds,
    ThirtySeconds,
    OneMinute,
    FiveMinutes,
    TenMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    ThreeHours,
    SixHours,
    TwelveHours,
    OneDay,
    OneWeek,
    OneMonth,
}

impl CandlePeriod {
    /// All periods, in ascending granularity order
    pub const ALL: [CandlePeriod; 17] = [
        CandlePeriod::OneSecond,
        CandlePeriod::FiveSeconds,
        CandlePeriod::TenSeconds,
        CandlePeriod::FifteenSeconds,
        CandlePeriod::ThirtySeconds,
        CandlePeriod::OneMinute,
        CandlePeriod::FiveMinutes,
        CandlePeriod::TenMinutes,
        CandlePeriod::FifteenMinutes,
        CandlePeriod::ThirtyMinutes,
        CandlePeriod::OneHour,
        CandlePeriod::ThreeHours,
        CandlePeriod::SixHours,
        CandlePeriod::TwelveHours,
        CandlePeriod::OneDay,
        CandlePeriod::OneWeek,
        CandlePeriod::OneMonth,
    ];

    /// Short code used in the database and configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            CandlePeriod::OneSecond => "1S",
            CandlePeriod::FiveSeconds => "5S",
            CandlePeriod::TenSeconds => "10S",
            CandlePeriod::FifteenSeconds => "15S",
            CandlePeriod::ThirtySeconds => "30S",
            CandlePeriod::OneMinute => "1M",
            CandlePeriod::FiveMinutes => "5M",
            CandlePeriod::TenMinutes => "10M",
            CandlePeriod::FifteenMinutes => "15M",
            CandlePeriod::ThirtyMinutes => "30M",
            CandlePeriod::OneHour => "1H",
            CandlePeriod::ThreeHours => "3H",
            CandlePeriod::SixHours => "6H",
            CandlePeriod::TwelveHours => "12H",
            CandlePeriod::OneDay => "1D",
            CandlePeriod::OneWeek => "1W",
            CandlePeriod::OneMonth => "1MO",
        }
    }

    /// Parse a short code
    pub fn parse(s: &str) -> Result<Self, PeriodParseError> {
        match s {
            "1S" => Ok(CandlePeriod::OneSecond),
            "5S" => Ok(CandlePeriod::FiveSeconds),
            "10S" => Ok(CandlePeriod::TenSeconds),
            "15S" => Ok(CandlePeriod::FifteenSeconds),
            "30S" => Ok(CandlePeriod::ThirtySeconds),
            "1M" => Ok(CandlePeriod::OneMinute),
            "5M" => Ok(CandlePeriod::FiveMinutes),
            "10M" => Ok(CandlePeriod::TenMinutes),
            "15M" => Ok(CandlePeriod::FifteenMinutes),
            "30M" => Ok(CandlePeriod::ThirtyMinutes),
            "1H" => Ok(CandlePeriod::OneHour),
            "3H" => Ok(CandlePeriod::ThreeHours),
            "6H" => Ok(CandlePeriod::SixHours),
            "12H" => Ok(CandlePeriod::TwelveHours),
            "1D" => Ok(CandlePeriod::OneDay),
            "1W" => Ok(CandlePeriod::OneWeek),
            "1MO" => Ok(CandlePeriod::OneMonth),
            other => Err(PeriodParseError::UnknownPeriod(other.to_string())),
        }
    }

    /// Nominal duration of one candle.
    ///
    /// A month has no fixed length; 30 days is used for scheduling purposes
    /// only.
    pub fn duration(&self) -> Duration {
        match self {
            CandlePeriod::OneSecond => Duration::seconds(1),
            CandlePeriod::FiveSeconds => Duration::seconds(5),
            CandlePeriod::TenSeconds => Duration::seconds(10),
            CandlePeriod::FifteenSeconds => Duration::seconds(15),
            CandlePeriod::ThirtySeconds => Duration::seconds(30),
            CandlePeriod::OneMinute => Duration::minutes(1),
            CandlePeriod::FiveMinutes => Duration::minutes(5),
            CandlePeriod::TenMinutes => Duration::minutes(10),
            CandlePeriod::FifteenMinutes => Duration::minutes(15),
            CandlePeriod::ThirtyMinutes => Duration::minutes(30),
            CandlePeriod::OneHour => Duration::hours(1),
            CandlePeriod::ThreeHours => Duration::hours(3),
            CandlePeriod::SixHours => Duration::hours(6),
            CandlePeriod::TwelveHours => Duration::hours(12),
            CandlePeriod::OneDay => Duration::days(1),
            CandlePeriod::OneWeek => Duration::weeks(1),
            CandlePeriod::OneMonth => Duration::days(30),
        }
    }
}

impl std::fmt::Display for CandlePeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for CandlePeriod {
    type Error = PeriodParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CandlePeriod::parse(&value)
    }
}

impl From<CandlePeriod> for String {
    fn from(value: CandlePeriod) -> Self {
        value.as_str().to_string()
    }
}

/// Parse a lookback window string into a duration.
///
/// The grammar is a positive integer followed by a unit suffix: `S` seconds,
/// `M` minutes, `H` hours, `D` days, `W` weeks. Months are rejected: a
/// lookback must have a fixed length.
pub fn parse_lookback(s: &str) -> Result<Duration, PeriodParseError> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit());

    let (count, unit) = match split {
        Some(i) if i > 0 => (&s[..i], &s[i..]),
        _ => return Err(PeriodParseError::InvalidLookback(s.to_string())),
    };

    let n: i64 = count
        .parse()
        .map_err(|_| PeriodParseError::InvalidLookback(s.to_string()))?;
    if n <= 0 {
        return Err(PeriodParseError::InvalidLookback(s.to_string()));
    }

    match unit {
        "S" => Ok(Duration::seconds(n)),
        "M" => Ok(Duration::minutes(n)),
        "H" => Ok(Duration::hours(n)),
        "D" => Ok(Duration::days(n)),
        "W" => Ok(Duration::weeks(n)),
        _ => Err(PeriodParseError::InvalidLookback(s.to_string())),
    }
}
