// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wall-clock source used to pick the active ratio.

use chrono::{DateTime, FixedOffset, Local, Timelike, Utc};
use tracing::warn;

use carbwise_config::model::DosingConfig;

/// Where the minute of day comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayClock {
    /// Host local time.
    Local,
    /// A fixed UTC offset.
    Fixed(FixedOffset),
}

impl DayClock {
    pub fn from_config(config: &DosingConfig) -> Self {
        match config.utc_offset_minutes {
            None => DayClock::Local,
            Some(minutes) => match FixedOffset::east_opt(minutes * 60) {
                Some(offset) => DayClock::Fixed(offset),
                None => {
                    warn!(utc_offset_minutes = minutes, "offset out of range, using local time");
                    DayClock::Local
                }
            },
        }
    }

    pub fn minute_of_day(&self) -> u32 {
        self.minute_at(Utc::now())
    }

    /// Minute of day (0..1440) at `instant` on this clock.
    pub fn minute_at(&self, instant: DateTime<Utc>) -> u32 {
        let (hour, minute) = match self {
            DayClock::Local => {
                let local = instant.with_timezone(&Local);
                (local.hour(), local.minute())
            }
            DayClock::Fixed(offset) => {
                let shifted = instant.with_timezone(offset);
                (shifted.hour(), shifted.minute())
            }
        };
        hour * 60 + minute
    }

    /// Renders a stored RFC 3339 timestamp as `DD.MM HH:MM` on this clock.
    /// Unparseable input is returned unchanged.
    pub fn format_timestamp(&self, rfc3339: &str) -> String {
        const FORMAT: &str = "%d.%m %H:%M";
        let Ok(instant) = DateTime::parse_from_rfc3339(rfc3339) else {
            return rfc3339.to_string();
        };
        match self {
            DayClock::Local => instant.with_timezone(&Local).format(FORMAT).to_string(),
            DayClock::Fixed(offset) => instant.with_timezone(offset).format(FORMAT).to_string(),
        }
    }
}
