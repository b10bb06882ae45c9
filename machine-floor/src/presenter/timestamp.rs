//! Timestamp parsing and display.
//!
//! Accepted inputs:
//!
//! - RFC 3339 with an offset (`2024-05-01T10:30:00Z`), converted to the
//!   display offset;
//! - local ISO-like text without an offset (`2024-05-01T10:30:00.123`,
//!   `2024-05-01 10:30`), shown as the wall-clock time it names;
//! - a bare date (`2024-05-01`), read as UTC midnight;
//! - a number, read as epoch milliseconds.
//!
//! Output is medium date plus short time, e.g. `May 1, 2024, 10:30 AM`.

use serde_json::Value;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use super::coerce::{display_text, is_truthy};
use super::format::PLACEHOLDER;

const DISPLAY: &[BorrowedFormatItem<'static>] = format_description!(
    "[month repr:short] [day padding:none], [year], [hour repr:12 padding:none]:[minute] [period]"
);

const LOCAL_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]"),
];

const DATE_ONLY: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// How parsed instants are placed on the wall clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimestampOptions {
    /// Offset that offset-bearing timestamps are converted to.
    pub display_offset: UtcOffset,

    /// Fixed shift added to every parsed instant. Zero unless configured;
    /// exists to compensate for upstream data that mislabels its time zone.
    pub correction: Duration,
}

impl TimestampOptions {
    /// Display in the host's local offset, falling back to UTC when it
    /// cannot be determined.
    pub fn local() -> Self {
        Self {
            display_offset: UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
            ..Self::default()
        }
    }

    /// Out-of-range offsets leave the current one in place; check them
    /// with [`display_offset`] first.
    pub fn with_display_offset_minutes(mut self, minutes: i32) -> Self {
        if let Some(offset) = display_offset(minutes) {
            self.display_offset = offset;
        }
        self
    }

    pub fn with_correction_minutes(mut self, minutes: i64) -> Self {
        self.correction = Duration::seconds(minutes.saturating_mul(60));
        self
    }
}

/// UTC offset for a signed minute count, if it is within ±25:59.
pub fn display_offset(minutes: i32) -> Option<UtcOffset> {
    UtcOffset::from_whole_seconds(minutes.checked_mul(60)?).ok()
}

impl Default for TimestampOptions {
    fn default() -> Self {
        Self {
            display_offset: UtcOffset::UTC,
            correction: Duration::ZERO,
        }
    }
}

/// Format a backend timestamp for display.
///
/// Falsy input (`null`, `""`, `0`, `false`) becomes [`PLACEHOLDER`]. Input
/// that does not parse as a date is returned unchanged.
pub fn format_date_time(value: &Value, options: &TimestampOptions) -> String {
    if !is_truthy(value) {
        return PLACEHOLDER.to_string();
    }

    let Some(parsed) = parse_timestamp(value, options.display_offset) else {
        return display_text(value);
    };

    let shifted = parsed.checked_add(options.correction).unwrap_or(parsed);
    shifted
        .format(DISPLAY)
        .unwrap_or_else(|_| display_text(value))
}

/// Parse into wall-clock time at `display_offset`.
fn parse_timestamp(value: &Value, display_offset: UtcOffset) -> Option<PrimitiveDateTime> {
    match value {
        Value::Number(n) => {
            let millis = n.as_f64()?;
            let nanos = (millis * 1_000_000.0) as i128;
            let instant = OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()?;
            Some(wall_clock(instant, display_offset))
        }
        Value::String(s) => parse_text(s.trim(), display_offset),
        _ => None,
    }
}

fn parse_text(s: &str, display_offset: UtcOffset) -> Option<PrimitiveDateTime> {
    if let Ok(instant) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(wall_clock(instant, display_offset));
    }

    if let Some(local) = LOCAL_FORMATS
        .iter()
        .find_map(|format| PrimitiveDateTime::parse(s, *format).ok())
    {
        return Some(local);
    }

    let date = Date::parse(s, DATE_ONLY).ok()?;
    Some(wall_clock(date.midnight().assume_utc(), display_offset))
}

fn wall_clock(instant: OffsetDateTime, offset: UtcOffset) -> PrimitiveDateTime {
    let local = instant.to_offset(offset);
    PrimitiveDateTime::new(local.date(), local.time())
}
