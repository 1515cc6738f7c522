// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time-of-day arithmetic for dosing-ratio periods.
//!
//! A [`TimePeriod`] is a pair of minute-of-day bounds in `0..1440`. A period
//! whose end is not after its start crosses midnight; such a period is
//! normalized by shifting the end forward by one day, so every period can be
//! treated as a single half-open range `[start, end)` with `end <= 2880`.
//! A period with `end == start` covers the whole day.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Bound, ValidationError};

/// Minutes in a day.
pub const MINUTES_PER_DAY: u32 = 1440;

/// A time-of-day range, possibly crossing midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimePeriod {
    start_minute: u32,
    end_minute: u32,
}

impl TimePeriod {
    /// Builds a period from minute-of-day bounds. An end of `1440` (24:00)
    /// is stored as `0`.
    pub fn from_minutes(start_minute: u32, end_minute: u32) -> Result<Self, ValidationError> {
        if start_minute >= MINUTES_PER_DAY {
            return Err(ValidationError::MinuteOutOfRange(start_minute));
        }
        if end_minute > MINUTES_PER_DAY {
            return Err(ValidationError::MinuteOutOfRange(end_minute));
        }
        Ok(Self {
            start_minute,
            end_minute: end_minute % MINUTES_PER_DAY,
        })
    }

    /// Parses `HH:MM-HH:MM`.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let parts: Vec<&str> = text.trim().split('-').collect();
        if parts.len() != 2 {
            return Err(ValidationError::InvalidPeriodFormat);
        }
        let start = parse_clock(parts[0], Bound::Start)?;
        let end = parse_clock(parts[1], Bound::End)?;
        Self::from_minutes(start, end)
    }

    pub fn start_minute(&self) -> u32 {
        self.start_minute
    }

    pub fn end_minute(&self) -> u32 {
        self.end_minute
    }

    /// True when the period crosses midnight (or spans the full day).
    pub fn wraps(&self) -> bool {
        self.end_minute <= self.start_minute
    }

    /// The single non-wrapping range `[start, end)` this period occupies.
    pub fn normalized(&self) -> (u32, u32) {
        if self.wraps() {
            (self.start_minute, self.end_minute + MINUTES_PER_DAY)
        } else {
            (self.start_minute, self.end_minute)
        }
    }

    pub fn duration_minutes(&self) -> u32 {
        let (start, end) = self.normalized();
        end - start
    }

    /// Whether `minute` (taken modulo a day) falls inside the period.
    pub fn contains(&self, minute: u32) -> bool {
        let minute = minute % MINUTES_PER_DAY;
        let (start, end) = self.normalized();
        (start <= minute && minute < end)
            || (start <= minute + MINUTES_PER_DAY && minute + MINUTES_PER_DAY < end)
    }

    /// Whether the two periods share at least one minute.
    ///
    /// Both sides are normalized; each is tested directly and shifted by one
    /// day so that a wrapping period behaves as `[s, 1440)` plus `[0, e)`.
    pub fn overlaps(&self, other: &TimePeriod) -> bool {
        let (s1, e1) = self.normalized();
        let (s2, e2) = other.normalized();
        let day = MINUTES_PER_DAY;
        intersects(s1, e1, s2, e2)
            || intersects(s1 + day, e1 + day, s2, e2)
            || intersects(s1, e1, s2 + day, e2 + day)
    }

    /// The period as linear segments inside `[0, 1440)`.
    pub fn segments(&self) -> Vec<(u32, u32)> {
        let (start, end) = self.normalized();
        if end <= MINUTES_PER_DAY {
            vec![(start, end)]
        } else {
            vec![(0, end - MINUTES_PER_DAY), (start, MINUTES_PER_DAY)]
        }
    }

    /// Rebuilds a period from linear segments produced by [`segments`]-style
    /// arithmetic. Accepts one segment, or two segments that meet at midnight.
    ///
    /// [`segments`]: TimePeriod::segments
    pub fn from_segments(segments: &[(u32, u32)]) -> Option<Self> {
        match segments {
            [(start, end)] => Self::from_minutes(*start, *end).ok(),
            [(0, morning_end), (evening_start, MINUTES_PER_DAY)] => {
                Self::from_minutes(*evening_start, *morning_end).ok()
            }
            _ => None,
        }
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = if self.end_minute == 0 {
            MINUTES_PER_DAY
        } else {
            self.end_minute
        };
        write!(
            f,
            "{}-{}",
            format_clock(self.start_minute),
            format_clock(end)
        )
    }
}

fn intersects(s1: u32, e1: u32, s2: u32, e2: u32) -> bool {
    s1 < e2 && s2 < e1
}

/// Formats a minute count as `HH:MM`. `1440` renders as `24:00`.
pub fn format_clock(minute: u32) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// Parses one `H:MM`/`HH:MM` bound into a minute of day.
///
/// Start bounds accept hours `0..=23`; end bounds additionally accept
/// `24:00`, returned as `1440`.
pub fn parse_clock(text: &str, bound: Bound) -> Result<u32, ValidationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptyBound);
    }
    let (hours, minutes) = text
        .split_once(':')
        .ok_or(ValidationError::InvalidTimeFormat(bound))?;
    let well_formed = (1..=2).contains(&hours.len())
        && minutes.len() == 2
        && hours.bytes().all(|b| b.is_ascii_digit())
        && minutes.bytes().all(|b| b.is_ascii_digit());
    if !well_formed {
        return Err(ValidationError::InvalidTimeFormat(bound));
    }
    let hours: u32 = hours
        .parse()
        .map_err(|_| ValidationError::InvalidTimeFormat(bound))?;
    let minutes: u32 = minutes
        .parse()
        .map_err(|_| ValidationError::InvalidTimeFormat(bound))?;
    if minutes > 59 {
        return Err(ValidationError::InvalidTimeFormat(bound));
    }
    match bound {
        Bound::Start if hours > 23 => Err(ValidationError::StartHourOutOfRange),
        Bound::End if hours > 24 => Err(ValidationError::EndHourOutOfRange),
        Bound::End if hours == 24 && minutes != 0 => Err(ValidationError::Hour24WithMinutes),
        _ => Ok(hours * 60 + minutes),
    }
}

/// Parses an `H:MM` duration (hours `0..=24`, minutes `0..=59`, non-zero)
/// into minutes.
pub fn parse_duration(text: &str) -> Result<u32, ValidationError> {
    let (hours, minutes) = text
        .trim()
        .split_once(':')
        .ok_or(ValidationError::InvalidDurationFormat)?;
    let hours: u32 = hours
        .trim()
        .parse()
        .map_err(|_| ValidationError::DurationHoursOutOfRange)?;
    if hours > 24 {
        return Err(ValidationError::DurationHoursOutOfRange);
    }
    let minutes: u32 = minutes
        .trim()
        .parse()
        .map_err(|_| ValidationError::DurationMinutesOutOfRange)?;
    if minutes > 59 {
        return Err(ValidationError::DurationMinutesOutOfRange);
    }
    let total = hours * 60 + minutes;
    if total == 0 {
        return Err(ValidationError::ZeroDuration);
    }
    Ok(total)
}

/// Parses a decimal number, accepting either `.` or `,` as separator.
pub fn parse_decimal(text: &str) -> Result<f64, ValidationError> {
    let normalized = text.trim().replace(',', ".");
    normalized
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ValidationError::InvalidNumber(text.trim().to_string()))
}
