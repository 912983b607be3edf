use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Recurring local-time interval during which a rule may fire.
///
/// `days` uses ISO numbering (1 = Monday .. 7 = Sunday). The interval is
/// half-open, `[start, end)`. When `end < start` it wraps past midnight and
/// the day check applies to the local day of the instant being tested, so a
/// Monday 22:00-06:00 window also admits Monday 05:00. `start == end` covers
/// the whole day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "midnight")]
    pub start: String,
    #[serde(default = "midnight")]
    pub end: String,
    #[serde(default = "every_day")]
    pub days: BTreeSet<u8>,
    /// IANA zone name; the engine default applies when absent.
    #[serde(default)]
    pub timezone: Option<String>,
}

fn midnight() -> String {
    "00:00".to_string()
}

fn every_day() -> BTreeSet<u8> {
    (1..=7).collect()
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            enabled: false,
            start: midnight(),
            end: midnight(),
            days: every_day(),
            timezone: None,
        }
    }
}

impl TimeWindow {
    pub fn validate(&self) -> Result<(), DomainError> {
        parse_minute_of_day(&self.start)?;
        parse_minute_of_day(&self.end)?;
        if let Some(day) = self.days.iter().find(|d| !(1..=7).contains(*d)) {
            return Err(DomainError::InvalidDay(*day));
        }
        if self.enabled && self.days.is_empty() {
            return Err(DomainError::InvalidRule(
                "time window is enabled but has no days".into(),
            ));
        }
        if let Some(tz) = &self.timezone {
            parse_timezone(tz)?;
        }
        Ok(())
    }

    /// Whether `at` falls inside the window. A disabled window admits everything.
    pub fn admits(&self, at: DateTime<Utc>, default_tz: Tz) -> Result<bool, DomainError> {
        if !self.enabled {
            return Ok(true);
        }

        let tz = match &self.timezone {
            Some(name) => parse_timezone(name)?,
            None => default_tz,
        };
        let local = at.with_timezone(&tz);

        let day = local.weekday().number_from_monday() as u8;
        if !self.days.contains(&day) {
            return Ok(false);
        }

        let start = parse_minute_of_day(&self.start)?;
        let end = parse_minute_of_day(&self.end)?;
        let minute = local.hour() * 60 + local.minute();

        let inside = if start == end {
            true
        } else if start < end {
            start <= minute && minute < end
        } else {
            minute >= start || minute < end
        };
        Ok(inside)
    }
}

/// Parses `"HH:MM"` into minutes since midnight.
pub fn parse_minute_of_day(s: &str) -> Result<u32, DomainError> {
    let invalid = || DomainError::InvalidTimeOfDay(s.to_string());
    let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return Err(invalid());
    }
    let hour: u32 = h.parse().map_err(|_| invalid())?;
    let minute: u32 = m.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok(hour * 60 + minute)
}

pub fn parse_timezone(name: &str) -> Result<Tz, DomainError> {
    name.parse::<Tz>()
        .map_err(|_| DomainError::InvalidTimezone(name.to_string()))
}
