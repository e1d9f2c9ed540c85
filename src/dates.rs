// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Timestamp parsing and date formatting.
//!
//! Chat timestamps are strings of fractional epoch seconds such as
//! `"1392734382.000200"`. [`Dates`] turns them into zoned date-times and
//! formats them with the patterns from [`Settings`].

use crate::settings::Settings;
use chrono::{DateTime, FixedOffset, Offset, Utc};

/// Text used wherever a timestamp cannot be turned into a date.
pub const DATE_PARSE_FAILURE: &str = "(failed to parse date)";

/// Formats raw epoch seconds for display inside message text.
///
/// The markup transformer calls this for `<!date^...>` directives. It is
/// implemented by [`Dates`] and by any `Fn(f64) -> String`.
pub trait FormatTimestamp {
    /// Returns the display string for the given epoch seconds.
    fn format_timestamp(&self, epoch_seconds: f64) -> String;
}

impl<F: Fn(f64) -> String> FormatTimestamp for F {
    fn format_timestamp(&self, epoch_seconds: f64) -> String {
        self(epoch_seconds)
    }
}

/// Date helper bound to one UTC offset and a set of format patterns.
#[derive(Debug, Clone)]
pub struct Dates {
    offset: FixedOffset,
    full: String,
    datetime: String,
    time: String,
}

impl Dates {
    /// Builds a helper from the offset and patterns in `settings`.
    ///
    /// Offsets outside ±24 hours fall back to UTC.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        let offset = FixedOffset::east_opt(settings.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix());
        Self {
            offset,
            full: settings.date_format_full.clone(),
            datetime: settings.datetime_format.clone(),
            time: settings.time_format.clone(),
        }
    }

    /// The offset all dates are shown in.
    #[must_use]
    pub const fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Human readable name of the offset, e.g. `UTC+02:00`.
    #[must_use]
    pub fn timezone_label(&self) -> String {
        format!("UTC{}", self.offset)
    }

    /// Converts fractional epoch seconds to a date-time at the configured offset.
    #[must_use]
    pub fn from_epoch(&self, epoch_seconds: f64) -> Option<DateTime<FixedOffset>> {
        if !epoch_seconds.is_finite() {
            return None;
        }
        let secs = epoch_seconds.floor();
        let nanos = ((epoch_seconds - secs) * 1e9).round().min(999_999_999.0) as u32;
        DateTime::from_timestamp(secs as i64, nanos).map(|dt| dt.with_timezone(&self.offset))
    }

    /// Parses a chat timestamp string.
    #[must_use]
    pub fn parse_ts(&self, ts: &str) -> Option<DateTime<FixedOffset>> {
        let (secs, frac) = ts.trim().split_once('.').unwrap_or((ts.trim(), ""));
        let secs: i64 = secs.parse().ok()?;
        let nanos = if frac.is_empty() {
            0
        } else {
            // Parsed as digits, not through f64, so microseconds survive
            if !frac.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let digits = &frac[..frac.len().min(9)];
            let scale = 10_u32.pow(9 - digits.len() as u32);
            digits.parse::<u32>().ok()? * scale
        };
        DateTime::from_timestamp(secs, nanos).map(|dt| dt.with_timezone(&self.offset))
    }

    /// Long form date used on day separators.
    #[must_use]
    pub fn full_date(&self, dt: &DateTime<FixedOffset>) -> String {
        dt.format(&self.full).to_string()
    }

    /// Short date and time.
    #[must_use]
    pub fn datetime(&self, dt: &DateTime<FixedOffset>) -> String {
        dt.format(&self.datetime).to_string()
    }

    /// Time of day only.
    #[must_use]
    pub fn time(&self, dt: &DateTime<FixedOffset>) -> String {
        dt.format(&self.time).to_string()
    }

    /// Formats a timestamp string as a short date and time.
    #[must_use]
    pub fn datetime_of_ts(&self, ts: &str) -> String {
        self.parse_ts(ts)
            .map_or_else(|| DATE_PARSE_FAILURE.to_owned(), |dt| self.datetime(&dt))
    }

    /// Formats a timestamp string as a time of day.
    #[must_use]
    pub fn time_of_ts(&self, ts: &str) -> String {
        self.parse_ts(ts)
            .map_or_else(|| DATE_PARSE_FAILURE.to_owned(), |dt| self.time(&dt))
    }
}

impl FormatTimestamp for Dates {
    fn format_timestamp(&self, epoch_seconds: f64) -> String {
        self.from_epoch(epoch_seconds)
            .map_or_else(|| DATE_PARSE_FAILURE.to_owned(), |dt| self.datetime(&dt))
    }
}
