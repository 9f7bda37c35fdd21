//! Conversions between human-typed amounts and integer base units, plus
//! the deadline and progress helpers shared by every screen.

use std::fmt;

use chrono::DateTime;

use crate::errors::{ClientError, Result};

/// Base units per whole ALGO.
pub const MICRO_PER_ALGO: u64 = 1_000_000;

/// Decimal places carried by the base unit.
const DECIMALS: u32 = 6;

/// Parses a user-typed decimal amount into integer base units.
///
/// Fractional digits beyond six are dropped, never rounded up, so the
/// sender cannot be charged more than what was typed.
pub fn to_base_units(text: &str) -> Result<u64> {
    let trimmed = text.trim();
    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid_amount(text));
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid_amount(text));
    }
    let whole_units: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid_amount(text))?
    };
    let mut frac_units: u64 = 0;
    for (i, b) in frac.bytes().take(DECIMALS as usize).enumerate() {
        frac_units += u64::from(b - b'0') * 10u64.pow(DECIMALS - 1 - i as u32);
    }
    whole_units
        .checked_mul(MICRO_PER_ALGO)
        .and_then(|v| v.checked_add(frac_units))
        .ok_or_else(|| invalid_amount(text))
}

fn invalid_amount(text: &str) -> ClientError {
    ClientError::InvalidArgument(format!("not a valid amount: {:?}", text.trim()))
}

/// Formats base units with two decimal places, rounding half up on the
/// third decimal. Values that came from a two-decimal input round-trip
/// exactly through [`to_base_units`].
pub fn to_display_units(base_units: u64) -> String {
    let cents = base_units / 10_000 + u64::from(base_units % 10_000 >= 5_000);
    format!("{}.{:02}", cents / 100, cents % 100)
}

/// Percentage of `target` raised so far, clamped to 100.
pub fn progress_percentage(collected: u64, target: u64) -> f64 {
    if target == 0 {
        return 0.0;
    }
    let pct = (collected as f64 / target as f64) * 100.0;
    pct.min(100.0)
}

/// Span between now and a deadline, broken into display parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRemaining {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub expired: bool,
}

impl fmt::Display for TimeRemaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.expired {
            write!(f, "Expired")
        } else if self.days > 0 {
            write!(f, "{}d {}h {}m", self.days, self.hours, self.minutes)
        } else if self.hours > 0 {
            write!(f, "{}h {}m", self.hours, self.minutes)
        } else {
            write!(f, "{}m", self.minutes)
        }
    }
}

/// Splits the seconds until `deadline` into days, hours and minutes.
/// A deadline at or before `now` is reported as expired.
pub fn time_remaining(deadline: i64, now: i64) -> TimeRemaining {
    let remaining = deadline.saturating_sub(now);
    if remaining <= 0 {
        return TimeRemaining { days: 0, hours: 0, minutes: 0, expired: true };
    }
    let remaining = remaining as u64;
    TimeRemaining {
        days: remaining / 86_400,
        hours: (remaining % 86_400) / 3_600,
        minutes: (remaining % 3_600) / 60,
        expired: false,
    }
}

/// Renders a unix timestamp as a calendar date for display.
pub fn format_timestamp(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| ts.to_string())
}
