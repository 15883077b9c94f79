//! Business-hours aware run scheduling for daemon mode.

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use std::time::Duration;

use crate::config::Config;

/// Parse an `HH:MM` clock time.
pub fn parse_clock(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

/// Interval between runs, shorter or longer depending on the time of day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSchedule {
    pub business_start: NaiveTime,
    pub business_end: NaiveTime,
    pub business_interval: Duration,
    pub off_hours_interval: Duration,
    /// Offset in which business hours are expressed.
    pub offset: FixedOffset,
}

impl PollSchedule {
    /// Build the schedule from the `[daemon]` and `[run]` sections.
    ///
    /// Returns `None` when the clock values or the offset are invalid;
    /// `validate_config` rejects those earlier.
    pub fn from_config(config: &Config) -> Option<Self> {
        Some(Self {
            business_start: parse_clock(&config.daemon.business_hours_start)?,
            business_end: parse_clock(&config.daemon.business_hours_end)?,
            business_interval: Duration::from_secs(config.daemon.business_interval_mins * 60),
            off_hours_interval: Duration::from_secs(config.daemon.off_hours_interval_mins * 60),
            offset: FixedOffset::east_opt(config.run.display_utc_offset_hours * 3600)?,
        })
    }

    /// Inclusive on both ends.
    pub fn is_business_hours(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset).time();
        self.business_start <= local && local <= self.business_end
    }

    pub fn interval_at(&self, now: DateTime<Utc>) -> Duration {
        if self.is_business_hours(now) {
            self.business_interval
        } else {
            self.off_hours_interval
        }
    }
}
