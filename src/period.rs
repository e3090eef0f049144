use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

// (year, month, day) boundaries; tuples compare lexicographically
const PERIOD_A_START: (i32, u32, u32) = (2017, 1, 20);
const PERIOD_A_END: (i32, u32, u32) = (2021, 1, 20);
const PERIOD_B_START: (i32, u32, u32) = (2025, 1, 20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdministrativePeriod {
    PeriodA,
    PeriodB,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeriodRange {
    pub start: NaiveDate,
    /// Exclusive; `None` means open-ended.
    pub end: Option<NaiveDate>,
}

fn ymd((year, month, day): (i32, u32, u32)) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

impl AdministrativePeriod {
    pub const ALL: [AdministrativePeriod; 3] = [Self::PeriodA, Self::PeriodB, Self::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PeriodA => "PERIOD_A",
            Self::PeriodB => "PERIOD_B",
            Self::Other => "OTHER",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::PeriodA => "Trump Administration 1 (2017-2021)",
            Self::PeriodB => "Trump Administration 2 (2025-)",
            Self::Other => "Other Period",
        }
    }

    pub fn short_label(&self) -> &'static str {
        match self {
            Self::PeriodA => "Trump 1",
            Self::PeriodB => "Trump 2",
            Self::Other => "Other",
        }
    }

    pub fn date_range(&self) -> PeriodRange {
        match self {
            Self::PeriodA => PeriodRange {
                start: ymd(PERIOD_A_START),
                end: Some(ymd(PERIOD_A_END)),
            },
            Self::PeriodB => PeriodRange {
                start: ymd(PERIOD_B_START),
                end: None,
            },
            Self::Other => PeriodRange {
                start: NaiveDate::default(),
                end: None,
            },
        }
    }
}

impl fmt::Display for AdministrativePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdministrativePeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown administrative period '{s}'"))
    }
}

/// Buckets a calendar day. Total over every representable date.
pub fn classify_day(day: NaiveDate) -> AdministrativePeriod {
    let key = (day.year(), day.month(), day.day());

    if key >= PERIOD_A_START && key < PERIOD_A_END {
        return AdministrativePeriod::PeriodA;
    }

    if key >= PERIOD_B_START {
        return AdministrativePeriod::PeriodB;
    }

    AdministrativePeriod::Other
}

/// Classifies by the UTC calendar day of `date`; time of day is ignored.
pub fn classify_period(date: DateTime<Utc>) -> AdministrativePeriod {
    classify_day(date.date_naive())
}

/// Last instant of the UTC day containing `now`.
pub fn end_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_milli_opt(23, 59, 59, 999)
        .map(|dt| dt.and_utc())
        .unwrap_or(now)
}

pub fn validate_event_date_at(
    date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), ValidationError> {
    let latest = end_of_day(now);
    if date > latest {
        return Err(ValidationError::FutureDate { date, latest });
    }
    Ok(())
}

/// Rejects event dates after the end of the current UTC day.
pub fn validate_event_date(date: DateTime<Utc>) -> Result<(), ValidationError> {
    validate_event_date_at(date, Utc::now())
}

/// Accepts `YYYY-MM-DD` (taken as midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_event_date(input: &str) -> Result<DateTime<Utc>, ValidationError> {
    let trimmed = input.trim();

    if let Ok(day) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = day.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ValidationError::InvalidDate(trimmed.to_string()))
}
