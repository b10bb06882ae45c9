//! Text formatting for durations and quantities.

use serde_json::Value;

use super::coerce::{coerce_number, display_text};

/// Shown wherever a value is missing or has no numeric reading.
pub const PLACEHOLDER: &str = "—";

/// Format a minute count as `"{h}h {mm}m"`.
///
/// Negative values (overdue targets) keep their sign: `-125` becomes
/// `"-2h 05m"`. Values without a numeric reading become [`PLACEHOLDER`].
pub fn minutes_to_hrs_minutes(value: &Value) -> String {
    format_minutes(coerce_number(value))
}

/// [`minutes_to_hrs_minutes`] for an already coerced count.
pub fn format_minutes(minutes: f64) -> String {
    if !minutes.is_finite() {
        return PLACEHOLDER.to_string();
    }

    // Round half up, then drop the sign; the sign is re-added from the
    // unrounded value.
    let total = (minutes + 0.5).floor().abs() as u64;
    let formatted = format!("{}h {:02}m", total / 60, total % 60);

    if minutes < 0.0 {
        format!("-{formatted}")
    } else {
        formatted
    }
}

/// Format a quantity with thousands separators.
///
/// `null` becomes [`PLACEHOLDER`]. A value with no numeric reading is shown
/// as-is rather than hidden, so odd backend text stays visible.
pub fn format_number(value: &Value) -> String {
    if value.is_null() {
        return PLACEHOLDER.to_string();
    }

    let number = coerce_number(value);
    if !number.is_finite() {
        return display_text(value);
    }

    group_thousands(number)
}

/// At most three fraction digits, trailing zeros dropped.
fn group_thousands(number: f64) -> String {
    // Ties round away from zero.
    let scaled = (number.abs() * 1000.0).round() / 1000.0;
    let abs = if scaled.is_finite() { scaled } else { number.abs() };
    let rounded = format!("{abs:.3}");
    let (int_part, frac_part) = rounded.split_once('.').unwrap_or((rounded.as_str(), ""));
    let frac_part = frac_part.trim_end_matches('0');

    let mut out = String::with_capacity(rounded.len() + int_part.len() / 3 + 1);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(digit);
    }
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }

    let is_zero = out.chars().all(|c| c == '0' || c == ',' || c == '.');
    if number < 0.0 && !is_zero {
        format!("-{out}")
    } else {
        out
    }
}
